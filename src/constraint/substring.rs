//! Word-substring recognizer.
//!
//! Accepts a non-empty run of whole words taken contiguously from a
//! template, followed by a terminator (`stop_at`). With an empty terminator
//! the run itself is accepted as soon as it ends on a word boundary.

use std::sync::Arc;

use crate::constraint::Recognizer;

/// Preprocessed template.
#[derive(Debug, Clone)]
pub struct SubstringTemplate {
    text: Vec<u8>,
    stop_at: Vec<u8>,
    /// Positions where a word starts.
    starts: Vec<usize>,
    /// `word_end[j]`: a match may end just before position `j`.
    word_end: Vec<bool>,
}

impl SubstringTemplate {
    pub fn new(template: &str, stop_at: &str) -> Self {
        let text = template.as_bytes().to_vec();
        let n = text.len();
        let is_ws = |i: usize| text[i].is_ascii_whitespace();

        let starts = (0..n)
            .filter(|&i| !is_ws(i) && (i == 0 || is_ws(i - 1)))
            .collect();
        let word_end = (0..=n)
            .map(|j| j > 0 && !is_ws(j - 1) && (j == n || is_ws(j)))
            .collect();

        Self {
            stop_at: stop_at.as_bytes().to_vec(),
            starts,
            word_end,
            text,
        }
    }
}

#[derive(Debug, Clone)]
struct State {
    /// Template positions reachable after the bytes so far.
    positions: Vec<usize>,
    /// Bytes of `stop_at` emitted, once the terminator has started.
    stop_progress: Option<usize>,
    /// No byte has been pushed yet.
    fresh: bool,
}

/// Byte recognizer over a [`SubstringTemplate`].
pub struct SubstringRecognizer {
    template: Arc<SubstringTemplate>,
    stack: Vec<State>,
}

impl SubstringRecognizer {
    pub fn new(template: Arc<SubstringTemplate>) -> Self {
        let initial = State {
            positions: template.starts.clone(),
            stop_progress: None,
            fresh: true,
        };
        Self {
            template,
            stack: vec![initial],
        }
    }

    fn state(&self) -> &State {
        &self.stack[self.stack.len() - 1]
    }

    fn at_word_end(&self, state: &State) -> bool {
        !state.fresh && state.positions.iter().any(|&j| self.template.word_end[j])
    }
}

impl Recognizer for SubstringRecognizer {
    fn push_byte(&mut self, byte: u8) -> bool {
        let t = &self.template;
        let state = self.state();

        let positions: Vec<usize> = state
            .positions
            .iter()
            .filter(|&&j| t.text.get(j) == Some(&byte))
            .map(|&j| j + 1)
            .collect();

        let stop_progress = match state.stop_progress {
            Some(k) => (t.stop_at.get(k) == Some(&byte)).then_some(k + 1),
            None => (self.at_word_end(state) && t.stop_at.first() == Some(&byte)).then_some(1),
        };

        if positions.is_empty() && stop_progress.is_none() {
            return false;
        }
        self.stack.push(State {
            positions,
            stop_progress,
            fresh: false,
        });
        true
    }

    fn pop_bytes(&mut self, n: usize) {
        let keep = self.stack.len().saturating_sub(n).max(1);
        self.stack.truncate(keep);
    }

    fn is_accepting(&self) -> bool {
        let state = self.state();
        if self.template.stop_at.is_empty() {
            self.at_word_end(state)
        } else {
            state.stop_progress == Some(self.template.stop_at.len())
        }
    }
}
