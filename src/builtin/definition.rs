//! Pipeline definitions from YAML

use crate::builtin::catalog::{Declared, MiddlewareDecl};
use crate::core::{HookOptions, HookSettings, PipelineKind};
use crate::execution::{Parallel, Waterfall};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Top-level pipeline definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Which engine runs the middleware
    #[serde(default)]
    pub kind: PipelineKind,

    /// Construction options
    #[serde(default)]
    pub settings: HookSettings,

    /// Value the run starts from
    #[serde(default)]
    pub initial: Value,

    /// External context handed to every middleware
    #[serde(default)]
    pub context: Value,

    /// Middleware, in registration order
    #[serde(default)]
    pub middleware: Vec<MiddlewareDecl>,
}

/// A definition turned into a runnable pipeline
pub enum BuiltPipeline {
    Waterfall(Waterfall<Value, Value>),
    Parallel(Parallel<Value, Value>),
}

impl PipelineDefinition {
    /// Load a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Validate the definition without building it
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        for (position, decl) in self.middleware.iter().enumerate() {
            Declared::from_decl(decl).with_context(|| {
                format!(
                    "Middleware #{} ('{}') in pipeline '{}' is invalid",
                    position + 1,
                    decl.name,
                    self.name
                )
            })?;
        }

        Ok(())
    }

    /// Resolve every declaration
    pub fn declarations(&self) -> Result<Vec<Declared>> {
        self.middleware
            .iter()
            .map(|decl| Declared::from_decl(decl).map_err(anyhow::Error::from))
            .collect()
    }

    /// Build the pipeline and register every middleware
    pub fn build(&self) -> Result<BuiltPipeline> {
        let declared = self.declarations()?;
        let options = HookOptions::from_settings(&self.settings);

        match self.kind {
            PipelineKind::Waterfall => {
                let hook = Waterfall::new(options);
                for middleware in declared {
                    hook.register(middleware.into_waterfall())?;
                }
                Ok(BuiltPipeline::Waterfall(hook))
            }
            PipelineKind::Parallel => {
                let hook = Parallel::new(options);
                for middleware in declared {
                    hook.register(middleware.into_parallel())?;
                }
                Ok(BuiltPipeline::Parallel(hook))
            }
        }
    }
}

impl BuiltPipeline {
    pub fn kind(&self) -> PipelineKind {
        match self {
            BuiltPipeline::Waterfall(_) => PipelineKind::Waterfall,
            BuiltPipeline::Parallel(_) => PipelineKind::Parallel,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BuiltPipeline::Waterfall(hook) => hook.listeners().len(),
            BuiltPipeline::Parallel(hook) => hook.listeners().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
