//! Steerlet - token-level controller runtime
//!
//! Lets a user program steer an autoregressive generation engine token by
//! token: restrict the next token, force exact text, backtrack, fork into
//! parallel continuations, and coordinate forks through shared variables.
//!
//! The host calls [`Driver::init_prompt`] once and [`Driver::step`] once
//! per generation step; the driver resumes the program just far enough to
//! answer each call.
//!
//! ```no_run
//! use std::sync::Arc;
//! use steerlet::prelude::*;
//!
//! let vocab = Vocabulary::from_strs(&["", "a", "b", "1", "2"], 0).unwrap();
//! let env = HostEnv::new(
//!     TokEnv::new(Arc::new(vocab)),
//!     VariableStore::new(),
//!     Arc::new(Config::default()),
//!     SeqId(0),
//! );
//! let mut driver = Driver::new(
//!     env,
//!     program(|ctrl| async move {
//!         ctrl.fixed("ab").await?;
//!         let opts = GenOptions::builder().regex(r"\d\d").build()?;
//!         ctrl.gen(&opts).await?;
//!         Ok(())
//!     }),
//! );
//! driver.init_prompt(&[1]).unwrap();
//! let result = driver.step(0, &[], &[SeqId(0)]).unwrap();
//! ```

// Core types
pub mod brle;
pub mod error;
pub mod host;
pub mod splice;
pub mod token_set;
pub mod tokenizer;

// Constraints and requests
pub mod constraint;
pub mod request;

// Program-facing and host-facing surfaces
pub mod bootstrap;
pub mod controller;
pub mod driver;
pub mod generate;
pub mod vars;

/// Index into the host's vocabulary.
pub type Token = u32;

pub use bootstrap::Config;
pub use controller::{Controller, Label};
pub use driver::{program, Driver, Program, Status};
pub use error::{ControllerError, Result};
pub use generate::{GenOptions, GenOptionsBuilder, Generate};
pub use host::{HostEnv, SeqId, StepEnv};
pub use request::{AnyToken, Committed, ConstrainedToken, FixedTokens, NextToken, StopToken};
pub use splice::{Branch, Splice, StepResult};
pub use token_set::TokenSet;
pub use vars::VariableStore;

/// Everything a program or host usually needs.
pub mod prelude {
    pub use crate::bootstrap::Config;
    pub use crate::constraint::{self, Constraint};
    pub use crate::controller::{Controller, Label};
    pub use crate::driver::{program, Driver, Program};
    pub use crate::generate::{GenOptions, Generate};
    pub use crate::host::{HostEnv, SeqId};
    pub use crate::request::{ConstrainedToken, FixedTokens, NextToken, StopToken};
    pub use crate::splice::{Branch, Splice, StepResult};
    pub use crate::token_set::TokenSet;
    pub use crate::tokenizer::{TokEnv, Tokenizer, Vocabulary};
    pub use crate::vars::VariableStore;
    pub use crate::Token;
}
