//! Error types for the controller runtime.

use thiserror::Error;

use crate::Token;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Errors that abort the sequence they occur in.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// A protocol or state-machine invariant was broken.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A splice or host step tried to erase more tokens than exist.
    #[error("cannot backtrack {requested} tokens, only {available} available")]
    Backtrack { requested: usize, available: usize },

    /// The host applied something other than the splice the driver went ahead with.
    #[error("host desync: expected backtrack={expected_backtrack} tokens={expected_tokens:?}, got backtrack={backtrack} tokens={tokens:?}")]
    Desync {
        expected_backtrack: u32,
        expected_tokens: Vec<Token>,
        backtrack: u32,
        tokens: Vec<Token>,
    },

    /// Constraint construction failed (bad regex, grammar, options).
    #[error("constraint error: {0}")]
    Constraint(String),

    /// The host realized a token the active constraint does not allow.
    #[error("token {token} violates the active constraint")]
    ConstraintViolation { token: Token },

    /// Generation options were rejected at construction.
    #[error("invalid generation options: {0}")]
    InvalidOptions(String),

    /// The user program returned an error.
    #[error("program failed: {0:#}")]
    Program(anyhow::Error),

    /// The sequence already failed; no further calls are accepted.
    #[error("sequence already failed")]
    Failed,
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        ControllerError::Program(err)
    }
}

impl ControllerError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        ControllerError::Invariant(msg.into())
    }
}
