//! CLI command definitions

use clap::Args;
use serde_json::Value;

/// Run a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Initial value as JSON (overrides the definition)
    #[arg(long, value_parser = parse_json)]
    pub initial: Option<Value>,

    /// External context as JSON (overrides the definition)
    #[arg(long, value_parser = parse_json)]
    pub context: Option<Value>,

    /// Run the pipeline this many times
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List the builtin middleware operations
#[derive(Debug, Args, Clone)]
pub struct CatalogCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse a JSON argument
pub fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("Invalid JSON '{}': {}", s, e))
}
