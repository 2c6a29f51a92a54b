//! Per-invocation control flow
//!
//! Every middleware call ends in exactly one [`Outcome`]. The engines match on
//! it instead of catching marker values, so a `finish` or `exit` can never be
//! confused with a real failure travelling through the error channel.

use std::fmt;

/// What a single middleware invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The middleware returned nothing
    Pass,
    /// The middleware produced a value
    Value(T),
    /// The middleware explicitly replaced the running value
    Replace(T),
    /// End the whole run with this value
    Finish(T),
    /// Decline to handle; the previous value passes through
    Ignore,
    /// End this middleware's turn without touching the running value
    Exit,
}

impl<T> Outcome<T> {
    /// Whether this outcome carries a value for the pipeline
    pub fn has_value(&self) -> bool {
        matches!(self, Outcome::Value(_) | Outcome::Replace(_) | Outcome::Finish(_))
    }

    /// Control name used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Value(_) => "value",
            Outcome::Replace(_) => "replace",
            Outcome::Finish(_) => "finish",
            Outcome::Ignore => "ignore",
            Outcome::Exit => "exit",
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Outcome::Value(v),
            None => Outcome::Pass,
        }
    }
}

/// A result raised through the error channel that ends the run successfully.
///
/// Middleware deep inside helper code can bail out with
/// `return Err(EarlyResult::new(v).into())`; the engine converts it into a
/// finish with `v` instead of reporting a failure.
pub struct EarlyResult<T> {
    pub value: T,
}

impl<T> EarlyResult<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: fmt::Debug> fmt::Debug for EarlyResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarlyResult")
            .field("fulfilled", &true)
            .field("value", &self.value)
            .finish()
    }
}

impl<T> fmt::Display for EarlyResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "early result")
    }
}

impl<T: fmt::Debug> std::error::Error for EarlyResult<T> {}

/// Split a middleware error into an early result or a real failure
pub(crate) fn take_early_result<T>(err: anyhow::Error) -> Result<T, anyhow::Error>
where
    T: fmt::Debug + Send + Sync + 'static,
{
    err.downcast::<EarlyResult<T>>().map(|early| early.value)
}
