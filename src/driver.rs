//! The driver - host entry points for one sequence.
//!
//! The host calls [`Driver::init_prompt`] once and then [`Driver::step`]
//! once per generation step. Each call resumes the suspended program
//! exactly until it awaits its next request (or ends), and answers with a
//! [`StepResult`].
//!
//! Step protocol:
//! 1. Reconcile history with what the host applied
//! 2. Commit the request compiled last step, resume the program
//! 3. Resolve fixed requests locally (fast path), merging their splices
//! 4. Compile the next request
//!
//! Forks are duplicated by replay: every host call is recorded, and
//! [`Driver::fork`] feeds the same calls into a fresh program instance.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::{FutureExt, LocalBoxFuture};
use tracing::{debug, trace, warn};

use crate::controller::{Controller, Pending, SeqState, Shared};
use crate::error::{ControllerError, Result};
use crate::host::{HostEnv, SeqId, StepEnv};
use crate::request::RequestState;
use crate::splice::{Splice, StepResult};
use crate::Token;

/// A user program: called once per sequence (and once more per replayed fork).
pub type Program = Rc<dyn Fn(Controller) -> LocalBoxFuture<'static, anyhow::Result<()>>>;

/// Wrap an async function as a [`Program`].
pub fn program<F, Fut>(f: F) -> Program
where
    F: Fn(Controller) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Rc::new(move |ctrl| f(ctrl).boxed_local())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Waiting for `init_prompt`.
    Created,
    Running,
    /// The program returned.
    Done,
    Failed,
}

#[derive(Debug, Clone)]
enum HostCall {
    InitPrompt(Vec<Token>),
    /// `repeat` identical steps in a row.
    Step {
        backtrack: u32,
        tokens: Vec<Token>,
        fork_group: Vec<SeqId>,
        repeat: u32,
    },
}

/// Drives one program on one sequence.
pub struct Driver {
    env: HostEnv,
    program: Program,
    future: Option<LocalBoxFuture<'static, anyhow::Result<()>>>,
    state: Shared,
    status: Status,
    /// Splice applied locally and returned to the host, awaiting confirmation.
    went_ahead: Option<Splice>,
    calls: Vec<HostCall>,
}

impl Driver {
    pub fn new(env: HostEnv, program: Program) -> Self {
        Self {
            env,
            program,
            future: None,
            state: Rc::new(RefCell::new(SeqState::default())),
            status: Status::Created,
            went_ahead: None,
            calls: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn seq_id(&self) -> SeqId {
        self.env.seq_id
    }

    /// The driver's view of the token history.
    pub fn tokens(&self) -> Vec<Token> {
        self.state.borrow().tokens.clone()
    }

    /// The sequence will produce nothing more.
    pub fn is_finished(&self) -> bool {
        self.status == Status::Done || self.state.borrow().stopped
    }

    fn ensure_usable(&self, entry: &str) -> Result<()> {
        match self.status {
            Status::Failed => Err(ControllerError::Failed),
            Status::Created if entry != "init_prompt" => {
                Err(ControllerError::invariant(format!("{entry} called before init_prompt")))
            }
            Status::Running | Status::Done if entry == "init_prompt" => {
                Err(ControllerError::invariant("init_prompt called twice"))
            }
            _ => Ok(()),
        }
    }

    /// Start the program on `prompt`. Runs it until its first request.
    pub fn init_prompt(&mut self, prompt: &[Token]) -> Result<()> {
        self.ensure_usable("init_prompt")?;
        self.calls.push(HostCall::InitPrompt(prompt.to_vec()));
        {
            let mut state = self.state.borrow_mut();
            state.tokens = prompt.to_vec();
            state.prompt_len = prompt.len();
            state.fork_group = vec![self.env.seq_id];
        }
        debug!(seq = %self.env.seq_id, prompt_len = prompt.len(), "init_prompt");

        let ctrl = Controller::new(self.state.clone(), self.env.clone());
        self.future = Some((self.program)(ctrl));
        self.status = Status::Running;

        let start = Instant::now();
        self.resume()?;
        self.check_budget("init_prompt", start, self.env.config.prompt_budget());
        Ok(())
    }

    /// Answer one host step. Any error fails the sequence for good.
    pub fn step(&mut self, backtrack: u32, tokens: &[Token], fork_group: &[SeqId]) -> Result<StepResult> {
        self.ensure_usable("step")?;
        self.record_step(backtrack, tokens, fork_group);
        let result = self.step_inner(backtrack, tokens, fork_group);
        if let Err(e) = &result {
            warn!(seq = %self.env.seq_id, error = %e, "sequence failed");
            self.status = Status::Failed;
            self.future = None;
        }
        result
    }

    fn record_step(&mut self, backtrack: u32, tokens: &[Token], fork_group: &[SeqId]) {
        if let Some(HostCall::Step {
            backtrack: last_backtrack,
            tokens: last_tokens,
            fork_group: last_group,
            repeat,
        }) = self.calls.last_mut()
        {
            if *last_backtrack == backtrack && last_tokens.as_slice() == tokens && last_group.as_slice() == fork_group {
                *repeat += 1;
                return;
            }
        }
        self.calls.push(HostCall::Step {
            backtrack,
            tokens: tokens.to_vec(),
            fork_group: fork_group.to_vec(),
            repeat: 1,
        });
    }

    fn step_inner(&mut self, backtrack: u32, tokens: &[Token], fork_group: &[SeqId]) -> Result<StepResult> {
        trace!(seq = %self.env.seq_id, backtrack, ?tokens, "step");
        self.reconcile(backtrack, tokens)?;
        self.state.borrow_mut().fork_group = fork_group.to_vec();

        if self.status == Status::Done {
            return Ok(StepResult::stop());
        }

        let compiled = matches!(
            self.state.borrow().pending.as_ref().map(|p| p.request.state()),
            Some(RequestState::Compiling)
        );
        if compiled {
            self.commit_pending(backtrack, tokens)?;
            self.resume()?;
        }

        self.compile_next()
    }

    /// Bring the local history in line with what the host applied.
    fn reconcile(&mut self, backtrack: u32, tokens: &[Token]) -> Result<()> {
        if let Some(expected) = self.went_ahead.take() {
            if expected.backtrack != backtrack || expected.ff_tokens != tokens {
                warn!(
                    seq = %self.env.seq_id,
                    expected_backtrack = expected.backtrack,
                    backtrack,
                    "host did not apply the fast-forward splice"
                );
                return Err(ControllerError::Desync {
                    expected_backtrack: expected.backtrack,
                    expected_tokens: expected.ff_tokens,
                    backtrack,
                    tokens: tokens.to_vec(),
                });
            }
            return Ok(());
        }
        if self.is_finished() {
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        Splice::new(backtrack, tokens.to_vec()).apply(&mut state.tokens)
    }

    fn commit_pending(&mut self, backtrack: u32, tokens: &[Token]) -> Result<()> {
        let start = Instant::now();
        let mut state = self.state.borrow_mut();
        let Some(mut pending) = state.pending.take() else {
            return Err(ControllerError::invariant("no request to commit"));
        };
        let env = StepEnv {
            tokens: &state.tokens,
            prompt_len: state.prompt_len,
            host: &self.env,
            replaying: state.is_replaying(),
        };
        pending.request.commit(&env, backtrack, tokens)?;
        if pending.request.is_stop() {
            state.stopped = true;
        }
        debug!(
            seq = %self.env.seq_id,
            ticket = pending.ticket,
            finished = pending.request.finished(),
            "request committed"
        );
        state.delivered = Some(pending);
        drop(state);
        self.check_budget("commit", start, self.env.config.commit_budget());
        Ok(())
    }

    /// Compile the pending request, resolving fixed ones locally first.
    fn compile_next(&mut self) -> Result<StepResult> {
        let mut merged: Option<Splice> = None;
        let mut forwarded = 0;

        loop {
            let mut state = self.state.borrow_mut();
            let Some(mut pending) = state.pending.take() else {
                drop(state);
                if self.status != Status::Done {
                    return Err(ControllerError::invariant("program suspended without a request"));
                }
                return Ok(match merged {
                    Some(splice) => self.went_ahead_result(splice),
                    None => StepResult::stop(),
                });
            };
            if state.stopped {
                return Err(ControllerError::invariant("request issued after the sequence was stopped"));
            }
            if pending.request.state() != RequestState::Created {
                return Err(ControllerError::invariant(format!(
                    "pending request in state {:?} at compile time",
                    pending.request.state()
                )));
            }

            let fast = pending.request.is_fixed() && forwarded < self.env.config.max_fast_forward;
            if !fast {
                if let Some(splice) = merged {
                    state.pending = Some(pending);
                    drop(state);
                    return Ok(self.went_ahead_result(splice));
                }
            }

            let start = Instant::now();
            let env = StepEnv {
                tokens: &state.tokens,
                prompt_len: state.prompt_len,
                host: &self.env,
                replaying: state.is_replaying(),
            };
            let result = pending.request.compile(&env)?;
            self.check_budget("compile", start, self.env.config.compile_budget());

            if !fast {
                debug!(seq = %self.env.seq_id, ticket = pending.ticket, branches = result.branches.len(), "request compiled");
                state.pending = Some(pending);
                return Ok(result);
            }

            // Fast path: apply locally, commit, and keep going.
            let Some(splice) = result.unconditional_splice().cloned() else {
                return Err(ControllerError::invariant("fixed request compiled to something other than a single splice"));
            };
            splice.apply(&mut state.tokens)?;
            let env = StepEnv {
                tokens: &state.tokens,
                prompt_len: state.prompt_len,
                host: &self.env,
                replaying: state.is_replaying(),
            };
            pending.request.commit(&env, splice.backtrack, &splice.ff_tokens)?;
            trace!(seq = %self.env.seq_id, backtrack = splice.backtrack, ff = ?splice.ff_tokens, "fast-forward");
            state.delivered = Some(Pending {
                ticket: pending.ticket,
                request: pending.request,
            });
            drop(state);

            merged = Some(match merged {
                Some(m) => m.merge(&splice),
                None => splice,
            });
            forwarded += 1;
            self.resume()?;
        }
    }

    fn went_ahead_result(&mut self, splice: Splice) -> StepResult {
        self.went_ahead = Some(splice.clone());
        StepResult {
            skip_me: true,
            ..StepResult::splice(splice)
        }
    }

    /// Poll the program until it blocks.
    fn resume(&mut self) -> Result<()> {
        let Some(future) = self.future.as_mut() else {
            return Ok(());
        };
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match future.as_mut().poll(&mut cx) {
            Poll::Pending => Ok(()),
            Poll::Ready(Ok(())) => {
                debug!(seq = %self.env.seq_id, "program finished");
                self.future = None;
                self.status = Status::Done;
                Ok(())
            }
            Poll::Ready(Err(err)) => {
                let message = format!("{err:#}");
                warn!(seq = %self.env.seq_id, error = %message, "program failed");
                self.future = None;
                self.status = Status::Failed;
                Err(ControllerError::Program(err))
            }
        }
    }

    fn check_budget(&self, phase: &str, start: Instant, budget: Duration) {
        let elapsed = start.elapsed();
        if elapsed > budget {
            warn!(
                seq = %self.env.seq_id,
                phase,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "time budget exceeded"
            );
        }
    }

    /// Duplicate this sequence as `seq_id` by replaying every host call
    /// into a fresh program instance. Variable reads and earlier fork
    /// indices are served from this driver's journal, variable writes are
    /// suppressed, and constrained requests skip mask building.
    pub fn fork(&self, seq_id: SeqId) -> Result<Driver> {
        if self.status == Status::Failed {
            return Err(ControllerError::Failed);
        }
        let mut child = Driver::new(self.env.with_seq_id(seq_id), self.program.clone());
        child.state.borrow_mut().replay = Some(self.state.borrow().journal.iter().cloned().collect());

        for call in &self.calls {
            match call {
                HostCall::InitPrompt(prompt) => child.init_prompt(prompt)?,
                HostCall::Step {
                    backtrack,
                    tokens,
                    fork_group,
                    repeat,
                } => {
                    for _ in 0..*repeat {
                        child.step(*backtrack, tokens, fork_group)?;
                    }
                }
            }
        }

        let (leftover, diverged) = {
            let mut state = child.state.borrow_mut();
            (state.replay.take().map_or(0, |r| r.len()), state.diverged)
        };
        if leftover > 0 || diverged || child.tokens() != self.tokens() {
            return Err(ControllerError::invariant(format!(
                "fork replay of {} diverged from {}",
                seq_id, self.env.seq_id
            )));
        }
        debug!(parent = %self.env.seq_id, child = %seq_id, calls = self.calls.len(), "forked by replay");
        Ok(child)
    }
}
