//! Token constraints.
//!
//! A [`Constraint`] is a forward-only state machine over the tokens a
//! sequence produces. It answers which tokens may come next and whether the
//! generation may (or must) end here. The runtime compiles constraints into
//! sampling masks once per step:
//!
//! 1. Build the constraint (lazily, inside the compile phase)
//! 2. `allow_tokens` → mask, plus EOS when `eos_allowed`
//! 3. Host samples under the mask
//! 4. `append_token` for every token the host realized
//!
//! Variants:
//!
//! - [`unconstrained`] -- every token allowed, never forces EOS
//! - [`regex()`] -- output matches a regex anchored at both ends
//! - [`grammar()`] -- output matches an EBNF grammar
//! - [`substring()`] -- output is a run of whole words of a template, then a terminator
//! - [`choose()`] -- output is exactly one of a list of options
//!
//! Byte-level variants implement [`Recognizer`] and are lifted to tokens by
//! [`ByteConstraint`], which walks the sorted vocabulary.

mod choose;
mod grammar;
mod recognizer;
mod regex;
mod substring;

use std::sync::Arc;

use crate::error::Result;
use crate::token_set::TokenSet;
use crate::tokenizer::TokEnv;
use crate::Token;

pub use choose::{ChooseRecognizer, Options};
pub use grammar::{GrammarProgram, GrammarRecognizer};
pub use recognizer::{ByteConstraint, Recognizer};
pub use regex::{RegexProgram, RegexRecognizer};
pub use substring::{SubstringRecognizer, SubstringTemplate};

/// Capability restricting which tokens may be emitted next.
pub trait Constraint {
    /// Whether generation may end at the current point.
    fn eos_allowed(&mut self) -> bool;

    /// Whether generation must end at the current point.
    fn eos_forced(&mut self) -> bool;

    /// Whether `token` may be appended next.
    fn token_allowed(&mut self, token: Token) -> bool;

    /// Advance past `token`. Fails if the token is not allowed.
    fn append_token(&mut self, token: Token) -> Result<()>;

    /// Add every allowed non-EOS token to `set`.
    fn allow_tokens(&mut self, set: &mut TokenSet) {
        for t in 0..set.len() as Token {
            if self.token_allowed(t) {
                set.add(t);
            }
        }
    }
}

/// Re-callable constraint constructor. Called again whenever a backtrack
/// forces the constraint to be rebuilt from scratch.
pub type ConstraintFactory = Box<dyn FnMut() -> Result<Box<dyn Constraint>>>;

/// A constraint that allows any token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconstrained;

impl Constraint for Unconstrained {
    fn eos_allowed(&mut self) -> bool {
        true
    }

    fn eos_forced(&mut self) -> bool {
        false
    }

    fn token_allowed(&mut self, _token: Token) -> bool {
        true
    }

    fn append_token(&mut self, _token: Token) -> Result<()> {
        Ok(())
    }

    fn allow_tokens(&mut self, set: &mut TokenSet) {
        set.set_all(true);
    }
}

/// Constraint that allows any token.
pub fn unconstrained() -> Box<dyn Constraint> {
    Box::new(Unconstrained)
}

/// Constraint matching `pattern`, implicitly anchored at start and end.
pub fn regex(env: &TokEnv, pattern: &str) -> Result<Box<dyn Constraint>> {
    let program = Arc::new(RegexProgram::new(pattern)?);
    Ok(Box::new(ByteConstraint::new(env.clone(), RegexRecognizer::new(program))))
}

/// Constraint matching an EBNF grammar (start rule `root`, or the first rule).
pub fn grammar(env: &TokEnv, source: &str) -> Result<Box<dyn Constraint>> {
    let program = Arc::new(GrammarProgram::from_ebnf(source)?);
    Ok(Box::new(ByteConstraint::new(env.clone(), GrammarRecognizer::new(program))))
}

/// Constraint producing whole words of `template` followed by `stop_at`.
pub fn substring(env: &TokEnv, template: &str, stop_at: &str) -> Result<Box<dyn Constraint>> {
    let template = Arc::new(SubstringTemplate::new(template, stop_at));
    Ok(Box::new(ByteConstraint::new(env.clone(), SubstringRecognizer::new(template))))
}

/// Constraint producing exactly one of `options`.
pub fn choose(env: &TokEnv, options: &[&str]) -> Result<Box<dyn Constraint>> {
    let options = Arc::new(Options::new(options)?);
    Ok(Box::new(ByteConstraint::new(env.clone(), ChooseRecognizer::new(options))))
}
