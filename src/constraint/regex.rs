//! Regex recognizer backed by a dense byte DFA.
//!
//! The pattern is compiled once into an anchored DFA with `MatchKind::All`,
//! so every continuation that can still lead to a match stays alive. A
//! match is only reported at end of input, which makes the regex implicitly
//! anchored at both ends.
//!
//! The DFA reports matches one byte late, so a byte past the end of a
//! complete match lands in a state that is neither dead nor quit. To keep
//! such bytes out, the reachable states are walked once at build time and
//! only those that can still reach an end-of-input match are kept live.

use std::collections::VecDeque;
use std::sync::Arc;

use regex_automata::dfa::{dense, Automaton, StartKind};
use rustc_hash::{FxHashMap, FxHashSet};
use regex_automata::util::primitives::StateID;
use regex_automata::{Anchored, Input, MatchKind};

use crate::constraint::Recognizer;
use crate::error::{ControllerError, Result};

/// A compiled regex, shareable across recognizers.
#[derive(Debug)]
pub struct RegexProgram {
    dfa: dense::DFA<Vec<u32>>,
    start: StateID,
    /// States from which some continuation matches at end of input.
    live: FxHashSet<StateID>,
}

impl RegexProgram {
    pub fn new(pattern: &str) -> Result<Self> {
        let dfa = dense::Builder::new()
            .configure(
                dense::Config::new()
                    .start_kind(StartKind::Anchored)
                    .match_kind(MatchKind::All),
            )
            .build(pattern)
            .map_err(|e| ControllerError::Constraint(format!("invalid regex {pattern:?}: {e}")))?;
        let start = dfa
            .start_state_forward(&Input::new("").anchored(Anchored::Yes))
            .map_err(|e| ControllerError::Constraint(format!("regex {pattern:?} has no start state: {e}")))?;
        let live = live_states(&dfa, start);
        Ok(Self { dfa, start, live })
    }

    /// Whether any continuation from `state` still matches.
    fn is_live(&self, state: StateID) -> bool {
        self.live.contains(&state)
    }

    fn is_accepting(&self, state: StateID) -> bool {
        self.dfa.is_match_state(self.dfa.next_eoi_state(state))
    }
}

/// Reachable states that can still reach an accepting state.
///
/// Forward BFS over all 256 bytes collects the reachable states with their
/// predecessors, then a backward BFS from the accepting ones marks the live set.
fn live_states(dfa: &dense::DFA<Vec<u32>>, start: StateID) -> FxHashSet<StateID> {
    let accepting = |s: StateID| dfa.is_match_state(dfa.next_eoi_state(s));
    let mut preds: FxHashMap<StateID, Vec<StateID>> = FxHashMap::default();
    let mut seen: FxHashSet<StateID> = FxHashSet::default();
    let mut queue = VecDeque::from([start]);
    seen.insert(start);

    while let Some(state) = queue.pop_front() {
        for byte in 0..=255u8 {
            let next = dfa.next_state(state, byte);
            if dfa.is_dead_state(next) || dfa.is_quit_state(next) {
                continue;
            }
            preds.entry(next).or_default().push(state);
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }

    let mut live: FxHashSet<StateID> = seen.iter().copied().filter(|&s| accepting(s)).collect();
    let mut queue: VecDeque<StateID> = live.iter().copied().collect();
    while let Some(state) = queue.pop_front() {
        for &prev in preds.get(&state).into_iter().flatten() {
            if live.insert(prev) {
                queue.push_back(prev);
            }
        }
    }
    live
}

/// Byte recognizer stepping a [`RegexProgram`].
pub struct RegexRecognizer {
    program: Arc<RegexProgram>,
    stack: Vec<StateID>,
}

impl RegexRecognizer {
    pub fn new(program: Arc<RegexProgram>) -> Self {
        let stack = vec![program.start];
        Self { program, stack }
    }

    fn state(&self) -> StateID {
        self.stack[self.stack.len() - 1]
    }
}

impl Recognizer for RegexRecognizer {
    fn push_byte(&mut self, byte: u8) -> bool {
        let next = self.program.dfa.next_state(self.state(), byte);
        if !self.program.is_live(next) {
            return false;
        }
        self.stack.push(next);
        true
    }

    fn pop_bytes(&mut self, n: usize) {
        let keep = self.stack.len().saturating_sub(n).max(1);
        self.stack.truncate(keep);
    }

    fn is_accepting(&self) -> bool {
        self.program.is_accepting(self.state())
    }
}
