//! hookflow - waterfall and parallel middleware pipelines
//!
//! A host registers named middleware against a pipeline and triggers runs
//! that thread a value through them. [`Waterfall`] feeds every result into
//! the next middleware; [`Parallel`] hands each middleware its own draft and
//! commits the recorded edits in one step.

pub mod builtin;
pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use crate::core::{
    EarlyResult, ExecutionInfo, FactoryContext, HookError, HookOptions, HookResult, HookReturn,
    Outcome, ParallelMiddleware, PipelineKind, WaterfallMiddleware,
};
pub use crate::execution::{Hooks, Parallel, RegisterInfo, Waterfall};

/// Everything needed to define and run pipelines
pub mod prelude {
    pub use crate::core::{
        EarlyResult, ExecPayload, ExecutionInfo, HookError, HookOptions, HookResult, HookReturn,
        HookSettings, Outcome, ParallelHandler, ParallelMiddleware, PipelineKind, SerdeShape,
        WaterfallHandler, WaterfallMiddleware,
    };
    pub use crate::execution::{Hooks, Parallel, RegisterInfo, Waterfall};
}
