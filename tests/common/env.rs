use std::sync::Arc;

use steerlet::prelude::*;

/// Multi-byte entries appended after the single printable ASCII bytes.
const WORDS: &[&str] = &[
    "Hello", " world", "Ultimate", " answer", " is", "42", "cat", "dog", " quick", " brown", " fox",
];

/// Id 0 is the empty EOS entry, ids 1..=95 are `' '..='~'`, then [`WORDS`].
pub fn vocabulary() -> Vocabulary {
    let singles: Vec<String> = (0x20u8..=0x7e).map(|b| (b as char).to_string()).collect();
    let mut entries: Vec<&str> = vec![""];
    entries.extend(singles.iter().map(String::as_str));
    entries.extend_from_slice(WORDS);
    Vocabulary::from_strs(&entries, 0).expect("fixture vocabulary")
}

/// Shared pieces a test needs to spin up drivers.
#[derive(Clone)]
pub struct MockEnv {
    pub tok: TokEnv,
    pub vars: VariableStore,
    pub config: Arc<Config>,
}

impl MockEnv {
    pub fn host_env(&self, seq_id: u32) -> HostEnv {
        HostEnv::new(self.tok.clone(), self.vars.clone(), self.config.clone(), SeqId(seq_id))
    }

    pub fn driver(&self, seq_id: u32, program: Program) -> Driver {
        Driver::new(self.host_env(seq_id), program)
    }

    pub fn token(&self, word: &str) -> Token {
        let ids = self.tok.tokenizer().tokenize(word);
        assert_eq!(ids.len(), 1, "{word:?} is not a single token");
        ids[0]
    }

    pub fn text(&self, tokens: &[Token]) -> String {
        String::from_utf8_lossy(&self.tok.tokenizer().detokenize(tokens)).into_owned()
    }
}

pub fn create_env() -> MockEnv {
    create_env_with(Config::default())
}

pub fn create_env_with(config: Config) -> MockEnv {
    MockEnv {
        tok: TokEnv::new(Arc::new(vocabulary())),
        vars: VariableStore::new(),
        config: Arc::new(config),
    }
}
