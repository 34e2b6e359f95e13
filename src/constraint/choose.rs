//! Choose-one-of-options recognizer.

use std::sync::Arc;

use crate::constraint::Recognizer;
use crate::error::{ControllerError, Result};

/// The option list, as bytes.
#[derive(Debug, Clone)]
pub struct Options {
    options: Vec<Vec<u8>>,
}

impl Options {
    pub fn new(options: &[&str]) -> Result<Self> {
        if options.is_empty() {
            return Err(ControllerError::Constraint("choose needs at least one option".into()));
        }
        Ok(Self {
            options: options.iter().map(|o| o.as_bytes().to_vec()).collect(),
        })
    }
}

/// Tracks which options are still consistent with the bytes pushed so far.
pub struct ChooseRecognizer {
    options: Arc<Options>,
    /// One entry per pushed byte (plus the initial one): surviving option indices.
    alive: Vec<Vec<usize>>,
}

impl ChooseRecognizer {
    pub fn new(options: Arc<Options>) -> Self {
        let all = (0..options.options.len()).collect();
        Self {
            options,
            alive: vec![all],
        }
    }

    fn depth(&self) -> usize {
        self.alive.len() - 1
    }

    fn current(&self) -> &[usize] {
        &self.alive[self.alive.len() - 1]
    }
}

impl Recognizer for ChooseRecognizer {
    fn push_byte(&mut self, byte: u8) -> bool {
        let depth = self.depth();
        let next: Vec<usize> = self
            .current()
            .iter()
            .copied()
            .filter(|&i| self.options.options[i].get(depth) == Some(&byte))
            .collect();
        if next.is_empty() {
            return false;
        }
        self.alive.push(next);
        true
    }

    fn pop_bytes(&mut self, n: usize) {
        let keep = self.alive.len().saturating_sub(n).max(1);
        self.alive.truncate(keep);
    }

    fn is_accepting(&self) -> bool {
        let depth = self.depth();
        self.current()
            .iter()
            .any(|&i| self.options.options[i].len() == depth)
    }

    fn byte_allowed(&mut self, byte: u8) -> bool {
        let depth = self.depth();
        self.current()
            .iter()
            .any(|&i| self.options.options[i].get(depth) == Some(&byte))
    }
}
