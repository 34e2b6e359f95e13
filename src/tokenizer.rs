//! Tokenizer capability and vocabulary handling.
//!
//! The runtime never tokenizes on its own; it consumes a [`Tokenizer`]
//! supplied by the host. [`Vocabulary`] is a byte-level reference
//! implementation (greedy longest match) used for embedding and tests.
//!
//! [`VocabIndex`] is built once per vocabulary and shared by all byte-level
//! constraints. It keeps the non-special tokens sorted by their bytes along
//! with trie subtree ranges, so mask computation can skip every token that
//! shares a rejected prefix in one jump.

use std::sync::Arc;

use anyhow::{ensure, Result};
use rustc_hash::FxHashMap;

use crate::Token;

/// Host-provided tokenizer.
pub trait Tokenizer: Send + Sync {
    /// Total number of tokens.
    fn vocab_size(&self) -> usize;

    /// The end-of-sequence token.
    fn eos_token(&self) -> Token;

    /// Bytes a token decodes to. Empty for special tokens.
    fn token_bytes(&self, token: Token) -> &[u8];

    /// Tokenize a byte string.
    fn tokenize_bytes(&self, bytes: &[u8]) -> Vec<Token>;

    fn tokenize(&self, text: &str) -> Vec<Token> {
        self.tokenize_bytes(text.as_bytes())
    }

    /// Concatenated bytes of the given tokens.
    fn detokenize(&self, tokens: &[Token]) -> Vec<u8> {
        tokens
            .iter()
            .flat_map(|&t| self.token_bytes(t).iter().copied())
            .collect()
    }

    /// Debug representation of a single token.
    fn token_repr(&self, token: Token) -> String {
        let bytes = self.token_bytes(token);
        if bytes.is_empty() {
            format!("<[{token}]>")
        } else {
            format!("⟦{}⟧", escape_bytes(bytes))
        }
    }

    /// Debug representation of a token sequence.
    fn tokens_repr(&self, tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|&t| self.token_repr(t))
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// Byte codecs
// ---------------------------------------------------------------------------

/// UTF-8 decode, replacing invalid sequences with U+FFFD.
pub fn buffer_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Render bytes as a `b"..."` literal.
pub fn buffer_repr(bytes: &[u8]) -> String {
    format!("b\"{}\"", escape_bytes(bytes))
}

fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Byte-level vocabulary with greedy longest-match tokenization.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Vec<Vec<u8>>,
    eos: Token,
    lookup: FxHashMap<Vec<u8>, Token>,
    max_word_len: usize,
}

impl Vocabulary {
    /// Build a vocabulary. Empty entries are special tokens; `eos` must be
    /// one of the ids.
    pub fn new(words: Vec<Vec<u8>>, eos: Token) -> Result<Self> {
        ensure!(
            (eos as usize) < words.len(),
            "eos token {} out of range for vocabulary of {}",
            eos,
            words.len()
        );

        let mut lookup = FxHashMap::default();
        let mut max_word_len = 0;
        for (id, word) in words.iter().enumerate() {
            if word.is_empty() {
                continue;
            }
            max_word_len = max_word_len.max(word.len());
            lookup.entry(word.clone()).or_insert(id as Token);
        }

        Ok(Self {
            words,
            eos,
            lookup,
            max_word_len,
        })
    }

    /// Build from string entries.
    pub fn from_strs(words: &[&str], eos: Token) -> Result<Self> {
        Self::new(words.iter().map(|w| w.as_bytes().to_vec()).collect(), eos)
    }

    /// Look up the id of an exact entry.
    pub fn token_id(&self, word: &[u8]) -> Option<Token> {
        self.lookup.get(word).copied()
    }
}

impl Tokenizer for Vocabulary {
    fn vocab_size(&self) -> usize {
        self.words.len()
    }

    fn eos_token(&self) -> Token {
        self.eos
    }

    fn token_bytes(&self, token: Token) -> &[u8] {
        self.words
            .get(token as usize)
            .map(|w| w.as_slice())
            .unwrap_or(&[])
    }

    /// Greedy longest match. Bytes with no entry are dropped with a warning,
    /// so the result may detokenize to less than `bytes`.
    fn tokenize_bytes(&self, bytes: &[u8]) -> Vec<Token> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let max = self.max_word_len.min(bytes.len() - pos);
            let found = (1..=max)
                .rev()
                .find_map(|len| self.lookup.get(&bytes[pos..pos + len]).map(|&t| (t, len)));
            match found {
                Some((token, len)) => {
                    out.push(token);
                    pos += len;
                }
                None => {
                    tracing::warn!("byte {:#04x} has no token, skipping", bytes[pos]);
                    pos += 1;
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Vocabulary index
// ---------------------------------------------------------------------------

/// Sorted view of a vocabulary for prefix-based mask computation.
#[derive(Debug, Clone)]
pub struct VocabIndex {
    /// Non-special tokens sorted lexicographically by bytes.
    sorted: Vec<(Token, Vec<u8>)>,
    /// For `sorted[i]`, the index of the first entry not prefixed by it.
    subtree_end: Vec<usize>,
    vocab_size: usize,
    eos: Token,
}

impl VocabIndex {
    pub fn new(tokenizer: &dyn Tokenizer) -> Self {
        let mut sorted: Vec<(Token, Vec<u8>)> = (0..tokenizer.vocab_size() as Token)
            .filter_map(|t| {
                let bytes = tokenizer.token_bytes(t);
                (!bytes.is_empty()).then(|| (t, bytes.to_vec()))
            })
            .collect();
        sorted.sort_by(|a, b| a.1.cmp(&b.1));
        let subtree_end = build_subtree_ranges(&sorted);

        Self {
            sorted,
            subtree_end,
            vocab_size: tokenizer.vocab_size(),
            eos: tokenizer.eos_token(),
        }
    }

    pub fn sorted(&self) -> &[(Token, Vec<u8>)] {
        &self.sorted
    }

    pub fn subtree_end(&self) -> &[usize] {
        &self.subtree_end
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn eos_token(&self) -> Token {
        self.eos
    }
}

/// A tokenizer together with its index, shared by everything that needs
/// to turn tokens into bytes.
#[derive(Clone)]
pub struct TokEnv {
    tokenizer: Arc<dyn Tokenizer>,
    index: Arc<VocabIndex>,
}

impl TokEnv {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        let index = Arc::new(VocabIndex::new(tokenizer.as_ref()));
        Self { tokenizer, index }
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn index(&self) -> &VocabIndex {
        &self.index
    }

    pub fn vocab_size(&self) -> usize {
        self.index.vocab_size()
    }

    pub fn eos_token(&self) -> Token {
        self.index.eos_token()
    }

    pub fn token_bytes(&self, token: Token) -> &[u8] {
        self.tokenizer.token_bytes(token)
    }
}

impl std::fmt::Debug for TokEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokEnv")
            .field("vocab_size", &self.vocab_size())
            .field("eos", &self.eos_token())
            .finish()
    }
}

/// For each sorted entry, find the first later entry it is not a prefix of.
fn build_subtree_ranges(sorted: &[(Token, Vec<u8>)]) -> Vec<usize> {
    let n = sorted.len();
    let mut ranges = vec![n; n];
    let mut stack: Vec<usize> = Vec::new();

    for i in 0..n {
        let s = &sorted[i].1;
        while let Some(&idx) = stack.last() {
            if s.starts_with(&sorted[idx].1) {
                break;
            }
            ranges[idx] = i;
            stack.pop();
        }
        stack.push(i);
    }

    ranges
}
