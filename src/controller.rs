//! The program-side handle.
//!
//! A [`Controller`] is what a user program holds. Awaiting a request through
//! it parks the request in the sequence state shared with the [`Driver`];
//! the future resolves once the driver has committed it. Everything here is
//! single-threaded: the program is only ever polled from inside a driver
//! call.
//!
//! [`Driver`]: crate::driver::Driver

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::{debug, info, warn};

use crate::bootstrap::Config;
use crate::error::{ControllerError, Result};
use crate::host::{HostEnv, SeqId};
use crate::request::{Committed, FixedTokens, ForkRequest, NextToken, PollRequest, Request, StopToken};
use crate::splice::Branch;
use crate::tokenizer::{buffer_to_string, TokEnv, Tokenizer};
use crate::Token;

// ---------------------------------------------------------------------------
// Shared sequence state
// ---------------------------------------------------------------------------

pub(crate) struct Pending {
    pub ticket: u64,
    pub request: Request,
}

/// One observation a forked replay must see again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JournalEntry {
    /// A `get_var` result.
    Var(Option<Vec<u8>>),
    /// Consecutive `wait_vars` checks that found a variable missing.
    Polled(u32),
    /// The values a `wait_vars` call returned.
    Waited(Vec<Vec<u8>>),
    /// This sequence's index in a resolved fork.
    Fork(usize),
}

/// State shared between a driver and the program it runs.
#[derive(Default)]
pub(crate) struct SeqState {
    pub tokens: Vec<Token>,
    pub prompt_len: usize,
    pub fork_group: Vec<SeqId>,
    /// The request the program is waiting on.
    pub pending: Option<Pending>,
    /// A committed request not yet picked up by its future.
    pub delivered: Option<Pending>,
    pub next_ticket: u64,
    /// A stop request was committed.
    pub stopped: bool,
    /// Every variable read and fork index, in order.
    pub journal: Vec<JournalEntry>,
    /// While replaying a fork: entries to serve instead of live values.
    pub replay: Option<VecDeque<JournalEntry>>,
    /// A replayed read did not line up with the journal.
    pub diverged: bool,
}

impl SeqState {
    pub fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    fn next_replayed(&mut self) -> Option<JournalEntry> {
        self.replay.as_mut().and_then(VecDeque::pop_front)
    }

    fn push_replayed(&mut self, entry: JournalEntry) {
        if let Some(replay) = self.replay.as_mut() {
            replay.push_front(entry);
        }
    }
}

pub(crate) type Shared = Rc<RefCell<SeqState>>;

/// Resolves once the driver commits the request it carries.
struct RequestFuture {
    state: Shared,
    request: Option<Request>,
    ticket: Option<u64>,
}

impl Future for RequestFuture {
    type Output = Result<Request>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut state = this.state.borrow_mut();

        let Some(ticket) = this.ticket else {
            if state.pending.is_some() {
                return Poll::Ready(Err(ControllerError::invariant(
                    "a request is already pending; await requests one at a time",
                )));
            }
            let Some(request) = this.request.take() else {
                return Poll::Ready(Err(ControllerError::invariant("request future polled after completion")));
            };
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.pending = Some(Pending { ticket, request });
            this.ticket = Some(ticket);
            return Poll::Pending;
        };

        match state.delivered.take() {
            Some(done) if done.ticket == ticket => Poll::Ready(Ok(done.request)),
            other => {
                state.delivered = other;
                Poll::Pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Handle a program uses to steer its sequence.
#[derive(Clone)]
pub struct Controller {
    state: Shared,
    env: HostEnv,
}

impl Controller {
    pub(crate) fn new(state: Shared, env: HostEnv) -> Self {
        Self { state, env }
    }

    pub fn env(&self) -> &HostEnv {
        &self.env
    }

    pub fn tok_env(&self) -> &TokEnv {
        &self.env.tok
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.env.tok.tokenizer()
    }

    pub fn seq_id(&self) -> SeqId {
        self.env.seq_id
    }

    pub fn config(&self) -> &Config {
        &self.env.config
    }

    /// Numeric config parameter, e.g. `"forks"`.
    pub fn get_config(&self, name: &str) -> Option<i64> {
        self.env.config.get(name)
    }

    pub fn eos_token(&self) -> Token {
        self.env.tok.eos_token()
    }

    /// The full token history, prompt included.
    pub fn tokens(&self) -> Vec<Token> {
        self.state.borrow().tokens.clone()
    }

    pub fn prompt_len(&self) -> usize {
        self.state.borrow().prompt_len
    }

    pub fn prompt(&self) -> Vec<Token> {
        let state = self.state.borrow();
        state.tokens[..state.prompt_len.min(state.tokens.len())].to_vec()
    }

    pub fn token_repr(&self, token: Token) -> String {
        self.tokenizer().token_repr(token)
    }

    pub fn tokens_repr(&self, tokens: &[Token]) -> String {
        self.tokenizer().tokens_repr(tokens)
    }

    pub(crate) fn history_len(&self) -> usize {
        self.state.borrow().tokens.len()
    }

    pub(crate) fn history_since(&self, ptr: usize) -> Vec<Token> {
        let state = self.state.borrow();
        state.tokens.get(ptr..).map(<[Token]>::to_vec).unwrap_or_default()
    }

    // -- requests -----------------------------------------------------------

    /// Hand `request` to the driver and wait until it is committed.
    pub async fn run<R: NextToken>(&self, request: R) -> Result<Committed<R>> {
        let done = RequestFuture {
            state: self.state.clone(),
            request: Some(Request::new(request)),
            ticket: None,
        }
        .await?;
        done.into_committed()
    }

    /// Force `text` at the end of the history.
    pub async fn fixed(&self, text: &str) -> Result<()> {
        self.run(FixedTokens::new(text)).await?;
        Ok(())
    }

    /// Sample EOS. Nothing may be requested afterwards.
    pub async fn stop(&self) -> Result<()> {
        self.run(StopToken::new()).await?;
        Ok(())
    }

    /// Split into `n` identical continuations; resolves to this sequence's index.
    pub async fn fork(&self, n: usize) -> Result<usize> {
        self.fork_branches((0..n).map(|_| Branch::noop()).collect()).await
    }

    /// Split into the given branches; resolves to this sequence's index.
    pub async fn fork_branches(&self, branches: Vec<Branch>) -> Result<usize> {
        let max = self.env.config.max_forks;
        if branches.is_empty() || branches.len() > max {
            return Err(ControllerError::invariant(format!(
                "fork needs between 1 and {max} branches, got {}",
                branches.len()
            )));
        }
        self.run(ForkRequest::new(branches)).await?;

        let me = self.env.seq_id;
        let mut state = self.state.borrow_mut();
        // Replayed forks were resolved under the parent's id; reuse its answer.
        let index = match state.next_replayed() {
            Some(JournalEntry::Fork(index)) => index,
            Some(other) => {
                return Err(ControllerError::invariant(format!(
                    "fork replay of {me} expected a fork, found {other:?}"
                )))
            }
            None if state.fork_group.len() == 1 => 0,
            None => state.fork_group.iter().position(|&id| id == me).ok_or_else(|| {
                ControllerError::invariant(format!("{me} is not in its fork group {:?}", state.fork_group))
            })?,
        };
        state.journal.push(JournalEntry::Fork(index));
        let group_size = state.fork_group.len();
        drop(state);
        info!(seq = %me, index, group_size, "fork resolved");
        Ok(index)
    }

    /// Capture the current history position.
    pub fn label(&self) -> Label {
        Label {
            ptr: self.history_len(),
            ctrl: self.clone(),
        }
    }

    // -- variables ----------------------------------------------------------

    /// Read a shared variable. Reads are journaled so forks replay them.
    pub fn get_var(&self, name: &str) -> Option<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        let value = match state.next_replayed() {
            Some(JournalEntry::Var(recorded)) => recorded,
            Some(other) => {
                warn!(seq = %self.env.seq_id, name, ?other, "fork replay read out of order");
                state.diverged = true;
                self.env.vars.get(name)
            }
            None => self.env.vars.get(name),
        };
        state.journal.push(JournalEntry::Var(value.clone()));
        value
    }

    pub fn set_var(&self, name: &str, value: impl Into<Vec<u8>>) {
        if self.state.borrow().is_replaying() {
            return;
        }
        self.env.vars.set(name, value);
    }

    pub fn append_var(&self, name: &str, value: &[u8]) {
        if self.state.borrow().is_replaying() {
            return;
        }
        self.env.vars.append(name, value);
    }

    /// Wait until every named variable exists, yielding one step at a time.
    pub async fn wait_vars(&self, names: &[&str]) -> Result<Vec<Vec<u8>>> {
        loop {
            if let Some(values) = self.check_vars_present(names)? {
                return Ok(values);
            }
            debug!(seq = %self.env.seq_id, ?names, "waiting for variables");
            self.run(PollRequest).await?;
        }
    }

    /// One `wait_vars` check. A run of failed checks journals as one entry.
    fn check_vars_present(&self, names: &[&str]) -> Result<Option<Vec<Vec<u8>>>> {
        let mut state = self.state.borrow_mut();
        let values = match state.next_replayed() {
            Some(JournalEntry::Polled(n)) => {
                if n > 1 {
                    state.push_replayed(JournalEntry::Polled(n - 1));
                }
                None
            }
            Some(JournalEntry::Waited(values)) => Some(values),
            Some(other) => {
                return Err(ControllerError::invariant(format!(
                    "fork replay of {} expected a variable wait, found {other:?}",
                    self.env.seq_id
                )))
            }
            None => names.iter().map(|n| self.env.vars.get(n)).collect(),
        };

        match &values {
            Some(values) => state.journal.push(JournalEntry::Waited(values.clone())),
            None => match state.journal.last_mut() {
                Some(JournalEntry::Polled(n)) => *n += 1,
                _ => state.journal.push(JournalEntry::Polled(1)),
            },
        }
        Ok(values)
    }
}

/// A position in the history.
#[derive(Clone)]
pub struct Label {
    ptr: usize,
    ctrl: Controller,
}

impl Label {
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    /// Tokens produced since the label was taken.
    pub fn tokens_since(&self) -> Vec<Token> {
        self.ctrl.history_since(self.ptr)
    }

    /// Text produced since the label was taken.
    pub fn text_since(&self) -> String {
        buffer_to_string(&self.ctrl.tokenizer().detokenize(&self.tokens_since()))
    }

    /// Replace everything after the label with `text`.
    pub async fn fixed_after(&self, text: &str) -> Result<()> {
        self.ctrl.run(FixedTokens::following(text, self.ptr)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Label").field("ptr", &self.ptr).finish()
    }
}
