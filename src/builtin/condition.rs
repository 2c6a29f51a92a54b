//! Guards deciding whether a declared middleware acts on a value

use crate::builtin::path::{lookup, parse_path};
use crate::core::{HookError, HookResult, PathSegment};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Guard configuration as written in YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Dotted path of the field to test
    pub path: String,

    /// Pattern the field must match
    pub matches: String,

    /// Whether `matches` is a regular expression rather than a substring
    #[serde(default = "default_use_regex")]
    pub use_regex: bool,
}

fn default_use_regex() -> bool {
    true
}

/// Pattern for matching a field (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum ConditionPattern {
    /// Simple substring match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl ConditionPattern {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ConditionPattern::Simple(pattern) => text.contains(pattern.as_str()),
            ConditionPattern::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Compiled guard
#[derive(Debug, Clone)]
pub struct Guard {
    pub path: Vec<PathSegment>,
    pub pattern: ConditionPattern,
}

impl Guard {
    pub fn from_config(config: &GuardConfig) -> HookResult<Self> {
        let pattern = if config.use_regex {
            let regex = Regex::new(&config.matches).map_err(|e| {
                HookError::Definition(format!("invalid guard pattern '{}': {}", config.matches, e))
            })?;
            ConditionPattern::Regex(regex)
        } else {
            ConditionPattern::Simple(config.matches.clone())
        };

        Ok(Self {
            path: parse_path(&config.path),
            pattern,
        })
    }

    /// True when the field exists and its text form matches.
    ///
    /// Strings are tested as-is; other scalars through their JSON rendering.
    pub fn allows(&self, value: &Value) -> bool {
        match lookup(value, &self.path) {
            Some(Value::String(text)) => self.pattern.matches(text),
            Some(Value::Null) | None => false,
            Some(other) => self.pattern.matches(&other.to_string()),
        }
    }
}
