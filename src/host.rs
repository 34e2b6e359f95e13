//! Host-provided environment.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bootstrap::Config;
use crate::tokenizer::{TokEnv, Tokenizer};
use crate::vars::VariableStore;
use crate::Token;

/// Identifier of one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(pub u32);

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

/// Everything a driver gets from its host.
#[derive(Clone, Debug)]
pub struct HostEnv {
    pub tok: TokEnv,
    pub vars: VariableStore,
    pub config: Arc<Config>,
    pub seq_id: SeqId,
}

impl HostEnv {
    pub fn new(tok: TokEnv, vars: VariableStore, config: Arc<Config>, seq_id: SeqId) -> Self {
        Self {
            tok,
            vars,
            config,
            seq_id,
        }
    }

    /// The same environment, for a different sequence.
    pub fn with_seq_id(&self, seq_id: SeqId) -> Self {
        Self {
            seq_id,
            ..self.clone()
        }
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tok.tokenizer()
    }
}

/// What a request sees while compiling or committing.
#[derive(Clone, Copy)]
pub struct StepEnv<'a> {
    /// Current token history, prompt included.
    pub tokens: &'a [Token],
    pub prompt_len: usize,
    pub host: &'a HostEnv,
    /// A fork is replaying its parent's calls; results are discarded.
    pub replaying: bool,
}

impl<'a> StepEnv<'a> {
    pub fn tok_env(&self) -> &'a TokEnv {
        &self.host.tok
    }

    pub fn tokenizer(&self) -> &'a dyn Tokenizer {
        self.host.tok.tokenizer()
    }

    pub fn vocab_size(&self) -> usize {
        self.host.tok.vocab_size()
    }

    pub fn eos_token(&self) -> Token {
        self.host.tok.eos_token()
    }
}
