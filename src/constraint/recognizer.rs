//! Byte-level recognizers and their lifting to token constraints.

use crate::constraint::Constraint;
use crate::error::{ControllerError, Result};
use crate::token_set::TokenSet;
use crate::tokenizer::TokEnv;
use crate::Token;

/// A byte-at-a-time acceptor with stack-like rollback.
///
/// `push_byte` either advances (returning `true`) or leaves the state
/// untouched. `pop_bytes(n)` undoes the last `n` successful pushes.
pub trait Recognizer {
    fn push_byte(&mut self, byte: u8) -> bool;

    fn pop_bytes(&mut self, n: usize);

    /// Whether the bytes pushed so far form a complete match.
    fn is_accepting(&self) -> bool;

    fn byte_allowed(&mut self, byte: u8) -> bool {
        if self.push_byte(byte) {
            self.pop_bytes(1);
            true
        } else {
            false
        }
    }

    /// Whether any byte can follow the current state.
    fn can_extend(&mut self) -> bool {
        (0..=255u8).any(|b| self.byte_allowed(b))
    }
}

/// Token constraint driven by a byte [`Recognizer`].
pub struct ByteConstraint<R> {
    env: TokEnv,
    rec: R,
    /// Scratch prefix for the vocabulary walk.
    prefix: Vec<u8>,
}

impl<R: Recognizer> ByteConstraint<R> {
    pub fn new(env: TokEnv, rec: R) -> Self {
        Self {
            env,
            rec,
            prefix: Vec::new(),
        }
    }

    pub fn recognizer(&self) -> &R {
        &self.rec
    }

    /// Push all bytes or none.
    fn try_push(&mut self, bytes: &[u8]) -> bool {
        for (i, &b) in bytes.iter().enumerate() {
            if !self.rec.push_byte(b) {
                self.rec.pop_bytes(i);
                return false;
            }
        }
        true
    }
}

impl<R: Recognizer> Constraint for ByteConstraint<R> {
    fn eos_allowed(&mut self) -> bool {
        self.rec.is_accepting()
    }

    fn eos_forced(&mut self) -> bool {
        self.rec.is_accepting() && !self.rec.can_extend()
    }

    fn token_allowed(&mut self, token: Token) -> bool {
        if token == self.env.eos_token() {
            return self.rec.is_accepting();
        }
        let bytes = self.env.token_bytes(token).to_vec();
        if bytes.is_empty() {
            return false;
        }
        let ok = self.try_push(&bytes);
        if ok {
            self.rec.pop_bytes(bytes.len());
        }
        ok
    }

    fn append_token(&mut self, token: Token) -> Result<()> {
        if token == self.env.eos_token() {
            return if self.rec.is_accepting() {
                Ok(())
            } else {
                Err(ControllerError::ConstraintViolation { token })
            };
        }
        let bytes = self.env.token_bytes(token).to_vec();
        if bytes.is_empty() || !self.try_push(&bytes) {
            return Err(ControllerError::ConstraintViolation { token });
        }
        Ok(())
    }

    /// Walk the sorted vocabulary, sharing recognizer work between tokens
    /// with a common prefix. A rejection at any byte of token `i` rejects
    /// every token in its trie subtree.
    fn allow_tokens(&mut self, set: &mut TokenSet) {
        let env = self.env.clone();
        let index = env.index();
        let sorted = index.sorted();
        let subtree_end = index.subtree_end();

        self.prefix.clear();
        let mut i = 0;
        while i < sorted.len() {
            let (token, ref bytes) = sorted[i];

            let common = longest_common_prefix(bytes, &self.prefix);
            if common < self.prefix.len() {
                self.rec.pop_bytes(self.prefix.len() - common);
                self.prefix.truncate(common);
            }

            let mut dead = false;
            for &b in &bytes[common..] {
                if !self.rec.push_byte(b) {
                    dead = true;
                    break;
                }
                self.prefix.push(b);
            }

            if dead {
                i = subtree_end[i];
            } else {
                set.add(token);
                i += 1;
            }
        }

        self.rec.pop_bytes(self.prefix.len());
        self.prefix.clear();
    }
}

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
