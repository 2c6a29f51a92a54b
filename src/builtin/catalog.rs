//! Declarative middleware catalog
//!
//! Pipelines loaded from YAML describe their middleware as data. Each
//! declaration resolves to a [`Declared`] handler that works on
//! `serde_json::Value` payloads and can be registered in either engine.

use crate::builtin::condition::{Guard, GuardConfig};
use crate::builtin::path::{kind_of, parse_path, remove, slot};
use crate::core::{
    EarlyResult, ExecutionInfo, HookError, HookResult, Outcome, ParallelHandler,
    ParallelMiddleware, PathSegment, WaterfallHandler, WaterfallMiddleware,
};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Middleware declaration as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareDecl {
    /// Identifying name, reported in errors and hooks
    #[serde(default)]
    pub name: String,

    /// Operation to perform, see [`Operation`]
    pub kind: String,

    /// Dotted path of the field the operation targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Operand: the value to set, add, multiply by, append or finish with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Error message for `fail`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Only act when the guard matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<GuardConfig>,
}

/// Catalog operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Set,
    Remove,
    Increment,
    Multiply,
    Append,
    Finish,
    Ignore,
    Exit,
    Fail,
    Early,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Set,
        Operation::Remove,
        Operation::Increment,
        Operation::Multiply,
        Operation::Append,
        Operation::Finish,
        Operation::Ignore,
        Operation::Exit,
        Operation::Fail,
        Operation::Early,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Remove => "remove",
            Operation::Increment => "increment",
            Operation::Multiply => "multiply",
            Operation::Append => "append",
            Operation::Finish => "finish",
            Operation::Ignore => "ignore",
            Operation::Exit => "exit",
            Operation::Fail => "fail",
            Operation::Early => "early",
        }
    }

    /// Operations that edit the payload at a path
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Set
                | Operation::Remove
                | Operation::Increment
                | Operation::Multiply
                | Operation::Append
        )
    }

    fn needs_value(&self) -> bool {
        matches!(
            self,
            Operation::Set | Operation::Append | Operation::Multiply | Operation::Finish | Operation::Early
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| HookError::InvalidMiddlewareKind(s.to_string()))
    }
}

/// A resolved declaration, usable as a handler in both engines
#[derive(Debug, Clone)]
pub struct Declared {
    pub name: String,
    pub operation: Operation,
    pub path: Vec<PathSegment>,
    pub value: Value,
    pub message: String,
    pub guard: Option<Guard>,
}

impl Declared {
    pub fn from_decl(decl: &MiddlewareDecl) -> HookResult<Self> {
        if decl.name.trim().is_empty() {
            return Err(HookError::InvalidMiddlewareName);
        }
        let operation: Operation = decl.kind.parse()?;

        if operation.is_mutation() && decl.path.is_none() {
            return Err(HookError::Definition(format!(
                "middleware '{}' ({}) requires a path",
                decl.name, operation
            )));
        }
        if operation.needs_value() && decl.value.is_none() {
            return Err(HookError::Definition(format!(
                "middleware '{}' ({}) requires a value",
                decl.name, operation
            )));
        }

        let value = match (operation, &decl.value) {
            (_, Some(value)) => value.clone(),
            (Operation::Increment, None) => Value::from(1),
            (_, None) => Value::Null,
        };
        if matches!(operation, Operation::Increment | Operation::Multiply) && !value.is_number() {
            return Err(HookError::Definition(format!(
                "middleware '{}' ({}) needs a numeric value, got {}",
                decl.name,
                operation,
                kind_of(&value)
            )));
        }

        let guard = decl.when.as_ref().map(Guard::from_config).transpose()?;

        Ok(Self {
            name: decl.name.clone(),
            operation,
            path: decl.path.as_deref().map(parse_path).unwrap_or_default(),
            value,
            message: decl
                .message
                .clone()
                .unwrap_or_else(|| format!("middleware '{}' failed", decl.name)),
            guard,
        })
    }

    pub fn into_waterfall(self) -> WaterfallMiddleware<Value, Value> {
        let name = self.name.clone();
        WaterfallMiddleware::with_handler(name, self)
    }

    pub fn into_parallel(self) -> ParallelMiddleware<Value, Value> {
        let name = self.name.clone();
        ParallelMiddleware::with_handler(name, self)
    }

    fn guard_allows(&self, value: &Value) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard.allows(value))
    }

    /// Apply a mutation operation to `target` in place
    fn mutate(&self, target: &mut Value) -> anyhow::Result<()> {
        match self.operation {
            Operation::Set => {
                *slot(target, &self.path)? = self.value.clone();
            }
            Operation::Remove => remove(target, &self.path)?,
            Operation::Increment => {
                let field = slot(target, &self.path)?;
                *field = arithmetic(field, &self.value, i64::checked_add, |a, b| a + b)?;
            }
            Operation::Multiply => {
                let field = slot(target, &self.path)?;
                *field = arithmetic(field, &self.value, i64::checked_mul, |a, b| a * b)?;
            }
            Operation::Append => {
                let field = slot(target, &self.path)?;
                if field.is_null() {
                    *field = Value::Array(Vec::new());
                }
                match field {
                    Value::Array(items) => items.push(self.value.clone()),
                    other => bail!("cannot append to {} at '{}'", kind_of(other), self.pointer()),
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Outcome for the non-mutation operations
    fn control(&self, info: &ExecutionInfo<Value>) -> anyhow::Result<Outcome<Value>> {
        match self.operation {
            Operation::Finish => Ok(info.finish(self.value.clone())),
            Operation::Ignore => Ok(info.ignore()),
            Operation::Exit => Ok(info.exit()),
            Operation::Fail => Err(anyhow!(self.message.clone())),
            Operation::Early => Err(anyhow::Error::new(EarlyResult::new(self.value.clone()))),
            _ => Ok(Outcome::Pass),
        }
    }

    fn pointer(&self) -> String {
        self.path.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(".")
    }
}

/// Combine the number at a field with an operand. Two integers stay exact
/// while the result fits in `i64`; anything else goes through `f64`.
fn arithmetic(
    field: &Value,
    operand: &Value,
    exact: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> anyhow::Result<Value> {
    let current = match field {
        Value::Null => serde_json::Number::from(0),
        Value::Number(n) => n.clone(),
        other => bail!("expected a number, found {}", kind_of(other)),
    };
    let Value::Number(operand) = operand else {
        bail!("expected a numeric operand, found {}", kind_of(operand));
    };

    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        if let Some(result) = exact(a, b) {
            return Ok(Value::from(result));
        }
    }

    let a = current.as_f64().ok_or_else(|| anyhow!("number out of range"))?;
    let b = operand.as_f64().ok_or_else(|| anyhow!("number out of range"))?;
    number(float(a, b))
}

/// Keep integers integral so `1 + 1` stays `2` rather than `2.0`
fn number(n: f64) -> anyhow::Result<Value> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| anyhow!("result {} is not a finite number", n))
}

#[async_trait]
impl WaterfallHandler<Value, Value> for Declared {
    async fn call(
        &self,
        value: Value,
        _context: Arc<Value>,
        info: ExecutionInfo<Value>,
    ) -> anyhow::Result<Outcome<Value>> {
        if !self.guard_allows(&value) {
            return Ok(Outcome::Pass);
        }
        if self.operation.is_mutation() {
            let mut value = value;
            self.mutate(&mut value)?;
            return Ok(Outcome::Value(value));
        }
        self.control(&info)
    }
}

impl ParallelHandler<Value, Value> for Declared {
    fn call(
        &self,
        draft: &mut Value,
        _context: &Value,
        info: &ExecutionInfo<Value>,
    ) -> anyhow::Result<Outcome<Value>> {
        if !self.guard_allows(draft) {
            return Ok(Outcome::Pass);
        }
        if self.operation.is_mutation() {
            self.mutate(draft)?;
            return Ok(Outcome::Pass);
        }
        self.control(info)
    }
}
