//! Requests - the per-step unit of work.
//!
//! A program awaits one request at a time. The driver moves it through
//! `Created → Compiling → Committed`:
//!
//! - **compile** (≈20ms budget) turns the request into a [`StepResult`]:
//!   sampling masks, forced splices, or both
//! - **commit** (≈1ms budget) tells the request which tokens the host
//!   actually realized, and may mark it finished
//!
//! A request whose compile always yields a pure splice and whose commit
//! does nothing reports [`NextToken::is_fixed`]; the driver resolves such
//! requests locally without a host round trip.

use std::any::Any;
use std::fmt;

use tracing::trace;

use crate::constraint::{Constraint, ConstraintFactory};
use crate::error::{ControllerError, Result};
use crate::host::StepEnv;
use crate::splice::{Branch, Splice, StepResult};
use crate::token_set::TokenSet;
use crate::tokenizer::buffer_to_string;
use crate::Token;

/// Conversion to `Any`, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Behaviour of a request. Every method has a default; an empty impl is a
/// request for one unconstrained token.
pub trait NextToken: AsAny {
    /// Produce this step's answer. Default: sample any token.
    fn compile(&mut self, env: &StepEnv) -> Result<StepResult> {
        Ok(StepResult::sample(TokenSet::all(env.vocab_size())))
    }

    /// Absorb the tokens the host realized.
    fn commit(&mut self, _env: &StepEnv, _backtrack: u32, _tokens: &[Token]) -> Result<()> {
        Ok(())
    }

    /// Compile always yields a pure splice and commit is a no-op.
    fn is_fixed(&self) -> bool {
        false
    }

    /// Set by commit when the sequence should end.
    fn finished(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Compiling,
    Committed,
}

/// A request plus its lifecycle.
pub struct Request {
    inner: Box<dyn NextToken>,
    state: RequestState,
    backtrack: u32,
    tokens: Vec<Token>,
    finished: bool,
}

impl Request {
    pub fn new<R: NextToken>(inner: R) -> Self {
        Self {
            inner: Box::new(inner),
            state: RequestState::Created,
            backtrack: 0,
            tokens: Vec::new(),
            finished: false,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_fixed(&self) -> bool {
        self.inner.is_fixed()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Whether this request ends the sequence once committed.
    pub fn is_stop(&self) -> bool {
        <dyn NextToken as AsAny>::as_any(self.inner.as_ref()).is::<StopToken>()
    }

    pub(crate) fn compile(&mut self, env: &StepEnv) -> Result<StepResult> {
        if self.state != RequestState::Created {
            return Err(ControllerError::invariant(format!(
                "compile on a request in state {:?}",
                self.state
            )));
        }
        self.state = RequestState::Compiling;
        self.inner.compile(env)
    }

    pub(crate) fn commit(&mut self, env: &StepEnv, backtrack: u32, tokens: &[Token]) -> Result<()> {
        if self.state != RequestState::Compiling {
            return Err(ControllerError::invariant(format!(
                "commit on a request in state {:?}",
                self.state
            )));
        }
        self.inner.commit(env, backtrack, tokens)?;
        self.state = RequestState::Committed;
        self.backtrack = backtrack;
        self.tokens = tokens.to_vec();
        self.finished = self.inner.finished();
        Ok(())
    }

    /// Recover the concrete request once committed.
    pub(crate) fn into_committed<R: NextToken>(self) -> Result<Committed<R>> {
        let Request {
            inner,
            backtrack,
            tokens,
            finished,
            ..
        } = self;
        match <dyn NextToken as AsAny>::into_any(inner).downcast::<R>() {
            Ok(request) => Ok(Committed {
                request: *request,
                backtrack,
                tokens,
                finished,
            }),
            Err(_) => Err(ControllerError::invariant("committed request has an unexpected type")),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("state", &self.state)
            .field("fixed", &self.is_fixed())
            .field("tokens", &self.tokens)
            .field("finished", &self.finished)
            .finish()
    }
}

/// A request handed back to the program after commit.
#[derive(Debug)]
pub struct Committed<R> {
    pub request: R,
    pub backtrack: u32,
    /// Tokens the host realized for this request.
    pub tokens: Vec<Token>,
    pub finished: bool,
}

// ---------------------------------------------------------------------------
// Built-in requests
// ---------------------------------------------------------------------------

/// One unconstrained token.
#[derive(Debug, Default)]
pub struct AnyToken;

impl NextToken for AnyToken {}

/// Force exact text, optionally replacing everything after a label.
///
/// Compile fails if the tokenizer cannot reproduce the text byte for byte.
#[derive(Debug, Clone)]
pub struct FixedTokens {
    text: Vec<u8>,
    following: Option<usize>,
    tokens: Vec<Token>,
}

impl FixedTokens {
    pub fn new(text: impl Into<Vec<u8>>) -> Self {
        Self {
            text: text.into(),
            following: None,
            tokens: Vec::new(),
        }
    }

    /// Erase the history back to `label_ptr` before forcing the text.
    pub fn following(text: impl Into<Vec<u8>>, label_ptr: usize) -> Self {
        Self {
            following: Some(label_ptr),
            ..Self::new(text)
        }
    }

    /// Tokens the text was tokenized to, once compiled.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

impl NextToken for FixedTokens {
    fn compile(&mut self, env: &StepEnv) -> Result<StepResult> {
        let backtrack = match self.following {
            Some(ptr) if ptr > env.tokens.len() => {
                return Err(ControllerError::invariant(format!(
                    "label at {ptr} is past the end of history ({})",
                    env.tokens.len()
                )))
            }
            Some(ptr) => (env.tokens.len() - ptr) as u32,
            None => 0,
        };
        self.tokens = env.tokenizer().tokenize_bytes(&self.text);
        if env.tokenizer().detokenize(&self.tokens) != self.text {
            return Err(ControllerError::invariant(format!(
                "fixed text {:?} has no exact tokenization",
                buffer_to_string(&self.text)
            )));
        }
        trace!(backtrack, tokens = ?self.tokens, "fixed tokens");
        Ok(StepResult::splice(Splice::new(backtrack, self.tokens.clone())))
    }

    fn is_fixed(&self) -> bool {
        true
    }
}

/// Sample EOS and end the sequence.
#[derive(Debug, Default)]
pub struct StopToken {
    finished: bool,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NextToken for StopToken {
    fn compile(&mut self, env: &StepEnv) -> Result<StepResult> {
        let mask = TokenSet::from_tokens(env.vocab_size(), [env.eos_token()]);
        Ok(StepResult::sample(mask))
    }

    fn commit(&mut self, _env: &StepEnv, _backtrack: u32, _tokens: &[Token]) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

/// One token allowed by a constraint.
///
/// The constraint is built lazily during compile, so construction errors
/// fail the compile instead of the program. The same instance can be run
/// repeatedly; the constraint carries over between runs.
pub struct ConstrainedToken {
    factory: ConstraintFactory,
    constraint: Option<Box<dyn Constraint>>,
    /// Non-EOS tokens appended to the constraint so far.
    realized: Vec<Token>,
    finished: bool,
}

impl ConstrainedToken {
    pub fn new(factory: ConstraintFactory) -> Self {
        Self {
            factory,
            constraint: None,
            realized: Vec::new(),
            finished: false,
        }
    }

    pub fn realized(&self) -> &[Token] {
        &self.realized
    }

    fn constraint(&mut self) -> Result<&mut Box<dyn Constraint>> {
        if self.constraint.is_none() {
            self.constraint = Some((self.factory)()?);
        }
        self.constraint
            .as_mut()
            .ok_or_else(|| ControllerError::invariant("constraint missing after construction"))
    }

    /// Constraints are forward-only: rebuild from scratch and replay.
    fn rewind(&mut self, backtrack: usize) -> Result<()> {
        if backtrack > self.realized.len() {
            return Err(ControllerError::Backtrack {
                requested: backtrack,
                available: self.realized.len(),
            });
        }
        self.realized.truncate(self.realized.len() - backtrack);
        let mut constraint = (self.factory)()?;
        for &t in &self.realized {
            constraint.append_token(t)?;
        }
        self.constraint = Some(constraint);
        Ok(())
    }
}

impl NextToken for ConstrainedToken {
    fn compile(&mut self, env: &StepEnv) -> Result<StepResult> {
        let vocab_size = env.vocab_size();
        let eos = env.eos_token();
        let constraint = self.constraint()?;

        if env.replaying {
            return Ok(StepResult::sample(TokenSet::new(vocab_size)));
        }
        if constraint.eos_forced() {
            return Ok(StepResult::sample(TokenSet::from_tokens(vocab_size, [eos])));
        }
        let mut mask = TokenSet::new(vocab_size);
        constraint.allow_tokens(&mut mask);
        if constraint.eos_allowed() {
            mask.add(eos);
        }
        Ok(StepResult::sample(mask))
    }

    fn commit(&mut self, env: &StepEnv, backtrack: u32, tokens: &[Token]) -> Result<()> {
        if backtrack > 0 {
            self.rewind(backtrack as usize)?;
        }
        let eos = env.eos_token();
        for &t in tokens {
            if t == eos {
                self.finished = true;
                break;
            }
            self.constraint()?.append_token(t)?;
            self.realized.push(t);
        }
        if !self.finished && self.constraint()?.eos_forced() {
            self.finished = true;
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

/// Split the sequence into the given branches.
#[derive(Debug)]
pub(crate) struct ForkRequest {
    branches: Vec<Branch>,
}

impl ForkRequest {
    pub(crate) fn new(branches: Vec<Branch>) -> Self {
        Self { branches }
    }
}

impl NextToken for ForkRequest {
    fn compile(&mut self, _env: &StepEnv) -> Result<StepResult> {
        Ok(StepResult::new(self.branches.clone()))
    }
}

/// Yield one step without sampling.
#[derive(Debug, Default)]
pub(crate) struct PollRequest;

impl NextToken for PollRequest {
    fn compile(&mut self, _env: &StepEnv) -> Result<StepResult> {
        Ok(StepResult::skip())
    }
}
