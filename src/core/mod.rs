//! Core domain models for hook pipelines
//!
//! This module defines the middleware handles, the registration ledger, the
//! per-invocation execution info, the draft patch format and the shared
//! factory context. The engines that drive them live in `execution`.

pub mod error;
pub mod factory;
pub mod info;
pub mod ledger;
pub mod middleware;
pub mod options;
pub mod outcome;
pub mod patch;

pub use error::*;
pub use factory::*;
pub use info::*;
pub use ledger::*;
pub use middleware::*;
pub use options::*;
pub use outcome::{EarlyResult, Outcome};
pub use patch::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two pipeline flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Sequential, each middleware feeds the next
    #[default]
    Waterfall,
    /// Fan-out, middleware observe the same input independently
    Parallel,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Waterfall => write!(f, "waterfall"),
            PipelineKind::Parallel => write!(f, "parallel"),
        }
    }
}
