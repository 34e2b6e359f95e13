//! A deterministic stand-in for an inference engine.
//!
//! Each round steps every live sequence once. Sampling picks the first
//! preferred token the mask allows, else the lowest allowed non-EOS
//! token, else EOS. Forks are realized with [`Driver::fork`].

use steerlet::prelude::*;
use steerlet::{ControllerError, Result};

use super::MockEnv;

pub struct Seq {
    pub driver: Driver,
    /// The host's own copy of the token history.
    pub history: Vec<Token>,
    next: (u32, Vec<Token>),
    group: Option<Vec<SeqId>>,
    pub finished: bool,
}

impl Seq {
    fn new(driver: Driver, history: Vec<Token>) -> Self {
        Self {
            driver,
            history,
            next: (0, Vec::new()),
            group: None,
            finished: false,
        }
    }
}

/// How a sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqOutcome {
    Running,
    Stopped,
}

pub struct MockHost {
    env: MockEnv,
    prefs: Vec<Token>,
    seqs: Vec<Seq>,
    next_id: u32,
    /// Total `step` calls issued.
    pub steps: usize,
}

impl MockHost {
    pub fn new(env: &MockEnv) -> Self {
        Self {
            env: env.clone(),
            prefs: Vec::new(),
            seqs: Vec::new(),
            next_id: 0,
            steps: 0,
        }
    }

    /// Tokens to sample first whenever a mask allows them, in order.
    pub fn prefer(mut self, words: &[&str]) -> Self {
        self.prefs = words.iter().map(|w| self.env.token(w)).collect();
        self
    }

    /// Start `program` on a new sequence with `prompt`.
    pub fn spawn(&mut self, prompt: &str, program: Program) -> Result<SeqId> {
        let id = self.next_id;
        self.next_id += 1;
        let prompt = self.env.tok.tokenizer().tokenize(prompt);
        let mut driver = self.env.driver(id, program);
        driver.init_prompt(&prompt)?;
        self.seqs.push(Seq::new(driver, prompt));
        Ok(SeqId(id))
    }

    pub fn seq(&self, id: SeqId) -> &Seq {
        self.seqs
            .iter()
            .find(|s| s.driver.seq_id() == id)
            .unwrap_or_else(|| panic!("no sequence {id}"))
    }

    pub fn ids(&self) -> Vec<SeqId> {
        self.seqs.iter().map(|s| s.driver.seq_id()).collect()
    }

    /// The full history as text, prompt included.
    pub fn text(&self, id: SeqId) -> String {
        self.env.text(&self.seq(id).history)
    }

    pub fn outcome(&self, id: SeqId) -> SeqOutcome {
        if self.seq(id).finished {
            SeqOutcome::Stopped
        } else {
            SeqOutcome::Running
        }
    }

    /// Step every live sequence once.
    pub fn round(&mut self) -> Result<()> {
        let live: Vec<usize> = (0..self.seqs.len()).filter(|&i| !self.seqs[i].finished).collect();
        let mut spawned = Vec::new();
        for idx in live {
            spawned.extend(self.step_one(idx)?);
        }
        self.seqs.extend(spawned);
        Ok(())
    }

    /// Run rounds until every sequence has stopped.
    pub fn run(&mut self) -> Result<()> {
        for _ in 0..500 {
            if self.seqs.iter().all(|s| s.finished) {
                return Ok(());
            }
            self.round()?;
        }
        Err(ControllerError::Invariant("mock host gave up after 500 rounds".into()))
    }

    fn step_one(&mut self, idx: usize) -> Result<Vec<Seq>> {
        let eos = self.env.tok.eos_token();
        let seq = &mut self.seqs[idx];
        let (backtrack, tokens) = std::mem::take(&mut seq.next);
        let me = seq.driver.seq_id();
        let group = seq.group.take().unwrap_or_else(|| vec![me]);

        let result = seq.driver.step(backtrack, &tokens, &group)?;
        self.steps += 1;

        if result.is_stop() {
            seq.finished = true;
            return Ok(Vec::new());
        }
        if result.skip_me {
            if let Some(splice) = result.unconditional_splice() {
                splice.apply(&mut seq.history)?;
                seq.next = (splice.backtrack, splice.ff_tokens.clone());
            }
            return Ok(Vec::new());
        }

        let branches = result.branches;
        if branches.len() == 1 {
            seq.next = realize(&branches[0], &mut seq.history, &self.prefs, eos)?;
            return Ok(Vec::new());
        }

        // Fork: branch 0 stays on this sequence, the rest get new ids.
        let mut children = Vec::new();
        for _ in 1..branches.len() {
            let id = SeqId(self.next_id);
            self.next_id += 1;
            let driver = seq.driver.fork(id)?;
            children.push(Seq::new(driver, seq.history.clone()));
        }
        let group: Vec<SeqId> = std::iter::once(me)
            .chain(children.iter().map(|c| c.driver.seq_id()))
            .collect();

        seq.next = realize(&branches[0], &mut seq.history, &self.prefs, eos)?;
        seq.group = Some(group.clone());
        for (child, branch) in children.iter_mut().zip(&branches[1..]) {
            child.next = realize(branch, &mut child.history, &self.prefs, eos)?;
            child.group = Some(group.clone());
        }
        Ok(children)
    }
}

/// Apply one branch to `history`; returns what to report next step.
fn realize(branch: &Branch, history: &mut Vec<Token>, prefs: &[Token], eos: Token) -> Result<(u32, Vec<Token>)> {
    if let Some(mask) = &branch.sample_mask {
        let token = pick(mask, prefs, eos);
        history.push(token);
        return Ok((0, vec![token]));
    }
    let mut merged = Splice::noop();
    for splice in &branch.splices {
        splice.apply(history)?;
        merged = merged.merge(splice);
    }
    Ok((merged.backtrack, merged.ff_tokens))
}

fn pick(mask: &TokenSet, prefs: &[Token], eos: Token) -> Token {
    prefs
        .iter()
        .copied()
        .find(|&t| mask.has(t))
        .or_else(|| mask.iter().find(|&t| t != eos))
        .unwrap_or_else(|| {
            assert!(mask.has(eos), "host was handed an empty mask");
            eos
        })
}
