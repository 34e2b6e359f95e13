//! Token sets over a fixed vocabulary.
//!
//! A `TokenSet` is a packed bitmask (`Vec<u32>`) where bit `i` indicates
//! whether token `i` is in the set. The number of tokens is fixed at
//! construction; indices outside `0..len()` are never members.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::brle::Brle;
use crate::Token;

/// Compute the number of `u32` words needed for `vocab_size` tokens.
pub fn bitmask_size(vocab_size: usize) -> usize {
    vocab_size.div_ceil(32)
}

/// A fixed-size set of tokens.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenSet {
    words: Vec<u32>,
    len: usize,
}

impl TokenSet {
    /// Create an empty set over `len` tokens.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; bitmask_size(len)],
            len,
        }
    }

    /// Create a set containing every token.
    pub fn all(len: usize) -> Self {
        let mut set = Self::new(len);
        set.set_all(true);
        set
    }

    /// Create a set from an iterator of members.
    pub fn from_tokens(len: usize, tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut set = Self::new(len);
        for t in tokens {
            set.add(t);
        }
        set
    }

    /// Number of possible tokens, regardless of membership.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.num_set() == 0
    }

    #[inline]
    pub fn add(&mut self, t: Token) {
        let i = t as usize;
        if i < self.len {
            self.words[i / 32] |= 1 << (i % 32);
        }
    }

    #[inline]
    pub fn remove(&mut self, t: Token) {
        let i = t as usize;
        if i < self.len {
            self.words[i / 32] &= !(1 << (i % 32));
        }
    }

    #[inline]
    pub fn has(&self, t: Token) -> bool {
        let i = t as usize;
        i < self.len && (self.words[i / 32] >> (i % 32)) & 1 == 1
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Include or exclude every token.
    pub fn set_all(&mut self, value: bool) {
        if !value {
            self.clear();
            return;
        }
        let full_words = self.len / 32;
        let remainder = self.len % 32;
        for word in self.words[..full_words].iter_mut() {
            *word = u32::MAX;
        }
        if remainder > 0 {
            self.words[full_words] = (1u32 << remainder) - 1;
        }
    }

    /// Number of tokens in the set.
    pub fn num_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Add every member of `other`.
    pub fn union(&mut self, other: &TokenSet) {
        debug_assert_eq!(self.len, other.len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    /// Keep only members also in `other`.
    pub fn intersect(&mut self, other: &TokenSet) {
        debug_assert_eq!(self.len, other.len);
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= *b;
        }
    }

    /// Iterate over members in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = Token> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros();
                w &= w - 1;
                Some((wi * 32) as Token + bit)
            })
        })
    }

    /// Packed bitmask words; bit `i` of word `i / 32` is token `i`.
    pub fn as_words(&self) -> &[u32] {
        &self.words
    }

    /// Apply the set to logits in place: non-members become `-inf`.
    pub fn apply_to_logits(&self, logits: &mut [f32]) {
        for (i, logit) in logits.iter_mut().enumerate() {
            if !self.has(i as Token) {
                *logit = f32::NEG_INFINITY;
            }
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.num_set();
        if n <= 16 {
            f.debug_set().entries(self.iter()).finish()
        } else {
            write!(f, "TokenSet({}/{})", n, self.len)
        }
    }
}

impl Serialize for TokenSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Brle::from_token_set(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TokenSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let brle = Brle::deserialize(deserializer)?;
        Ok(brle.to_token_set())
    }
}
