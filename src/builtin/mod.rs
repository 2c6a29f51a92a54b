//! Declarative middleware and YAML pipeline definitions

pub mod catalog;
pub mod condition;
pub mod definition;
pub mod path;
pub mod report;

pub use catalog::{Declared, MiddlewareDecl, Operation};
pub use condition::{ConditionPattern, Guard, GuardConfig};
pub use definition::{BuiltPipeline, PipelineDefinition};
pub use report::RunReport;
