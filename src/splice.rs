//! Splices, branches and step results.
//!
//! A [`Splice`] is a forced edit of the token history: erase `backtrack`
//! trailing tokens, then append `ff_tokens`. A [`Branch`] is one candidate
//! continuation of a sequence, either a list of splices or a sampling mask.
//! A [`StepResult`] is the per-step answer handed back to the host.
//!
//! Splices compose: [`Splice::merge`] produces the single splice that has
//! the same effect as applying two splices in order. The driver uses this to
//! collapse a run of forced requests into one answer.

use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};
use crate::token_set::TokenSet;
use crate::Token;

/// A forced edit of the token history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splice {
    /// Tokens to erase from the end of the history.
    pub backtrack: u32,
    /// Tokens to append after erasing.
    pub ff_tokens: Vec<Token>,
    /// Sampled tokens this splice is conditional on. Empty = unconditional.
    #[serde(default)]
    pub when_sampled: Vec<Token>,
}

impl Splice {
    pub fn new(backtrack: u32, ff_tokens: Vec<Token>) -> Self {
        Self {
            backtrack,
            ff_tokens,
            when_sampled: Vec::new(),
        }
    }

    /// The splice that changes nothing.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.backtrack == 0 && self.ff_tokens.is_empty()
    }

    /// The single splice equivalent to applying `self`, then `next`.
    ///
    /// `next` first erases from what `self` appended; whatever it erases
    /// beyond that reaches into the original history.
    pub fn merge(&self, next: &Splice) -> Splice {
        let appended = self.ff_tokens.len();
        let bt = next.backtrack as usize;
        let (backtrack, mut ff_tokens) = if bt <= appended {
            (self.backtrack, self.ff_tokens[..appended - bt].to_vec())
        } else {
            (self.backtrack + (bt - appended) as u32, Vec::new())
        };
        ff_tokens.extend_from_slice(&next.ff_tokens);
        Splice {
            backtrack,
            ff_tokens,
            when_sampled: next.when_sampled.clone(),
        }
    }

    /// Merge in place.
    pub fn add_splice(&mut self, next: &Splice) {
        *self = self.merge(next);
    }

    /// Apply to `history`. Fails without modifying it when backtracking
    /// beyond its start.
    pub fn apply(&self, history: &mut Vec<Token>) -> Result<()> {
        let bt = self.backtrack as usize;
        if bt > history.len() {
            return Err(ControllerError::Backtrack {
                requested: bt,
                available: history.len(),
            });
        }
        history.truncate(history.len() - bt);
        history.extend_from_slice(&self.ff_tokens);
        Ok(())
    }
}

/// One candidate continuation of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub splices: Vec<Splice>,
    /// Restrict sampling to these tokens. `None` = no sampling.
    pub sample_mask: Option<TokenSet>,
}

impl Branch {
    /// A branch forcing exactly one edit.
    pub fn splice(splice: Splice) -> Self {
        Self {
            splices: vec![splice],
            sample_mask: None,
        }
    }

    /// A branch that changes nothing.
    pub fn noop() -> Self {
        Self::splice(Splice::noop())
    }

    /// A branch sampling one token from `mask`.
    pub fn sample(mask: TokenSet) -> Self {
        Self {
            splices: Vec::new(),
            sample_mask: Some(mask),
        }
    }

    /// Exactly one splice and no sampling.
    pub fn is_splice(&self) -> bool {
        self.splices.len() == 1 && self.sample_mask.is_none()
    }

    pub fn as_splice(&self) -> Option<&Splice> {
        if self.is_splice() {
            self.splices.first()
        } else {
            None
        }
    }
}

/// The answer to one host step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepResult {
    /// The host must not sample for this sequence this step.
    pub skip_me: bool,
    /// Candidate continuations. Empty with `skip_me == false` = finished.
    pub branches: Vec<Branch>,
}

impl StepResult {
    pub fn new(branches: Vec<Branch>) -> Self {
        Self {
            skip_me: false,
            branches,
        }
    }

    /// The sequence is finished.
    pub fn stop() -> Self {
        Self::default()
    }

    /// Nothing to sample this step.
    pub fn skip() -> Self {
        Self {
            skip_me: true,
            branches: Vec::new(),
        }
    }

    /// Sample one token from `mask`.
    pub fn sample(mask: TokenSet) -> Self {
        Self::new(vec![Branch::sample(mask)])
    }

    /// Force a single edit.
    pub fn splice(splice: Splice) -> Self {
        Self::new(vec![Branch::splice(splice)])
    }

    pub fn is_stop(&self) -> bool {
        !self.skip_me && self.branches.is_empty()
    }

    /// Exactly one branch, and it is a pure splice.
    pub fn is_splice(&self) -> bool {
        self.branches.len() == 1 && self.branches[0].is_splice()
    }

    /// The single pure splice, if this result is one.
    pub fn unconditional_splice(&self) -> Option<&Splice> {
        match self.branches.as_slice() {
            [branch] => branch.as_splice(),
            _ => None,
        }
    }
}
