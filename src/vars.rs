//! Variable Store - shared name → bytes map
//!
//! One store is shared by every sequence of a generation (forks included),
//! so programs running on different sequences can coordinate. Writes are
//! last-writer-wins; there is no deletion.

use std::sync::Arc;

use dashmap::DashMap;

/// Cheaply cloneable handle to a shared variable map.
#[derive(Clone, Debug, Default)]
pub struct VariableStore {
    vars: Arc<DashMap<String, Vec<u8>>>,
}

impl VariableStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `name`.
    pub fn set(&self, name: &str, value: impl Into<Vec<u8>>) {
        self.vars.insert(name.to_string(), value.into());
    }

    /// Append to `name`, creating it if absent.
    pub fn append(&self, name: &str, value: &[u8]) {
        self.vars
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(value);
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.vars.get(name).map(|v| v.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// All variable names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
