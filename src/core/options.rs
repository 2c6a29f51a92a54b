//! Construction-time options, instrumentation hooks and shape validators

use crate::core::{BoxFuture, MiddlewareRef, PipelineKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Payload handed to the instrumentation hooks around every middleware call
pub struct ExecPayload<T, C> {
    pub kind: PipelineKind,
    /// Running value before (start hook) or after (end hook) the call
    pub current: T,
    /// The middleware about to run, or that just ran
    pub middleware: MiddlewareRef,
    /// External context passed to `exec`
    pub context: Arc<C>,
}

/// What an instrumentation hook wants done with the running value
pub enum HookReturn<T> {
    /// Leave the value as is
    Keep,
    /// Use this value instead
    Replace(T),
    /// Resolve later; only waterfall pipelines accept this
    Deferred(BoxFuture<Option<T>>),
}

impl<T> fmt::Debug for HookReturn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookReturn::Keep => write!(f, "Keep"),
            HookReturn::Replace(_) => write!(f, "Replace(..)"),
            HookReturn::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

/// Instrumentation hook
pub type ExecHook<T, C> = Arc<dyn Fn(ExecPayload<T, C>) -> HookReturn<T> + Send + Sync>;

/// Checks the shape of every value a middleware produces
pub trait ShapeValidator<T>: Send + Sync {
    fn validate(&self, value: &T) -> Result<(), String>;
}

impl<T, F> ShapeValidator<T> for F
where
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &T) -> Result<(), String> {
        (self)(value)
    }
}

/// Validator accepting any value that deserializes as `S`
pub struct SerdeShape<S> {
    _shape: PhantomData<fn() -> S>,
}

impl<S> SerdeShape<S> {
    pub fn new() -> Self {
        Self {
            _shape: PhantomData,
        }
    }
}

impl<S> Default for SerdeShape<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize, S: DeserializeOwned> ShapeValidator<T> for SerdeShape<S> {
    fn validate(&self, value: &T) -> Result<(), String> {
        let encoded = serde_json::to_value(value).map_err(|e| e.to_string())?;
        serde_json::from_value::<S>(encoded)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Serializable subset of the options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    /// Caps the number of runs across every pipeline sharing a context
    pub executions_count_limit: Option<usize>,

    /// End the run with the first produced value
    pub return_on_first: bool,
}

/// Named construction options
pub struct HookOptions<T, C> {
    pub executions_count_limit: Option<usize>,
    pub return_on_first: bool,
    pub on_exec_start: Option<ExecHook<T, C>>,
    pub on_exec_end: Option<ExecHook<T, C>>,
    pub validator: Option<Arc<dyn ShapeValidator<T>>>,
}

impl<T, C> Default for HookOptions<T, C> {
    fn default() -> Self {
        Self {
            executions_count_limit: None,
            return_on_first: false,
            on_exec_start: None,
            on_exec_end: None,
            validator: None,
        }
    }
}

impl<T, C> HookOptions<T, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &HookSettings) -> Self {
        Self {
            executions_count_limit: settings.executions_count_limit,
            return_on_first: settings.return_on_first,
            ..Self::default()
        }
    }

    pub fn with_executions_count_limit(mut self, limit: usize) -> Self {
        self.executions_count_limit = Some(limit);
        self
    }

    pub fn with_return_on_first(mut self, return_on_first: bool) -> Self {
        self.return_on_first = return_on_first;
        self
    }

    pub fn with_on_exec_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(ExecPayload<T, C>) -> HookReturn<T> + Send + Sync + 'static,
    {
        self.on_exec_start = Some(Arc::new(hook));
        self
    }

    pub fn with_on_exec_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(ExecPayload<T, C>) -> HookReturn<T> + Send + Sync + 'static,
    {
        self.on_exec_end = Some(Arc::new(hook));
        self
    }

    pub fn with_validator(mut self, validator: impl ShapeValidator<T> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}
