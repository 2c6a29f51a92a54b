//! Error types for hook registration and execution

use crate::core::PipelineKind;
use thiserror::Error;

/// Errors surfaced by pipeline registration and `exec`
#[derive(Debug, Error)]
pub enum HookError {
    /// A declared middleware did not resolve to anything callable
    #[error("\"{0}\" is not a valid middleware type")]
    InvalidMiddlewareKind(String),

    /// The middleware has no identifying name
    #[error("hook middleware must be named function.")]
    InvalidMiddlewareName,

    /// Registration attempted after the first `exec`
    #[error("pipeline is frozen, cannot register \"{name}\" after the first exec")]
    PipelineFrozen { name: String },

    /// Admission control rejected the run
    #[error("This plugin has a executions count limit of {limit}.\nThe next run count would be {next}.")]
    ExecutionLimitExceeded { limit: usize, next: usize },

    /// A middleware body failed
    #[error("middleware \"{name}\" failed: {source}")]
    Middleware {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The value a run settled on failed the configured shape validator
    #[error("post-run value failed validation: {reason}")]
    ShapeValidation { reason: String },

    /// A control primitive that this pipeline kind does not support
    #[error("{control}() is not supported by {kind} pipelines")]
    UnsupportedControl {
        kind: PipelineKind,
        control: &'static str,
    },

    /// An instrumentation hook returned a deferred value where only
    /// immediate values are allowed
    #[error("Expected {kind} hooks to return non Promise values.")]
    DeferredHook { kind: PipelineKind },

    /// The payload could not be converted to or from its structured form
    #[error("draft error: {0}")]
    Draft(#[from] serde_json::Error),

    /// Invalid pipeline definition
    #[error("invalid definition: {0}")]
    Definition(String),
}

impl HookError {
    /// The original middleware error, if this is a middleware failure
    pub fn middleware_source(&self) -> Option<&anyhow::Error> {
        match self {
            HookError::Middleware { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate
pub type HookResult<T> = Result<T, HookError>;
