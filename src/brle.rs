//! Binary run-length encoding of token masks.
//!
//! Sampling masks cross the host boundary once per step, and most of them
//! are long runs of allowed or disallowed tokens. The encoding stores the
//! lengths of alternating runs, always starting with a run of `false`
//! (possibly zero-length).
//!
//! - `[false, false, true, true, true, false]` is encoded as `[2, 3, 1]`.
//! - `[true, true, false]` is encoded as `[0, 2, 1]`.

use serde::{Deserialize, Serialize};

use crate::token_set::TokenSet;
use crate::Token;

/// Run-length encoded boolean vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Brle {
    /// Total number of booleans represented.
    #[serde(rename = "size")]
    pub total_size: usize,
    /// Run lengths. Even indices are `false` runs, odd indices `true` runs.
    #[serde(rename = "runs")]
    pub buffer: Vec<u32>,
}

impl Brle {
    /// Encode a token set.
    pub fn from_token_set(set: &TokenSet) -> Self {
        let total_size = set.len();
        let mut buffer = Vec::new();
        let mut current = false;
        let mut run = 0u32;
        for i in 0..total_size {
            let bit = set.has(i as Token);
            if bit != current {
                buffer.push(run);
                current = bit;
                run = 0;
            }
            run += 1;
        }
        if total_size > 0 {
            buffer.push(run);
        }
        Self { total_size, buffer }
    }

    /// Decode into a token set. Runs past `total_size` are ignored.
    pub fn to_token_set(&self) -> TokenSet {
        let mut set = TokenSet::new(self.total_size);
        for (start, end) in self.true_ranges() {
            for t in start..end.min(self.total_size) {
                set.add(t as Token);
            }
        }
        set
    }

    /// Half-open index ranges covered by `true` runs.
    pub fn true_ranges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut pos = 0usize;
        self.buffer.iter().enumerate().filter_map(move |(i, &len)| {
            let start = pos;
            pos += len as usize;
            (i % 2 == 1 && len > 0).then_some((start, pos))
        })
    }

    /// Number of `true` values.
    pub fn count_true(&self) -> usize {
        self.true_ranges().map(|(s, e)| e - s).sum()
    }
}
