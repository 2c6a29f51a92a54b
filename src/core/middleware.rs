//! Middleware handles and handler traits
//!
//! A middleware is a named, identity-carrying handle around a type-erased
//! handler. The handle is cheap to clone and every clone shares the same
//! [`MiddlewareId`], which is what index lookups compare.
//!
//! ```text
//! async fn times2(v, ctx, info) { … }         ← user writes this
//!        ↓ WaterfallMiddleware::from_fn(times2)
//! Middleware { id, name: "times2", handler } ← Arc<dyn WaterfallHandler>
//!        ↓ waterfall.register(mw)
//! handler.call(value, ctx, info) at exec time
//! ```

use crate::core::{ExecutionInfo, HookError, HookResult, Outcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// A heap-allocated, type-erased future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Stable identity of a registered middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MiddlewareId(Uuid);

impl MiddlewareId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lightweight description of a middleware, used in snapshots and hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareRef {
    pub id: MiddlewareId,
    pub name: Arc<str>,
}

/// Handler for waterfall pipelines.
///
/// Receives the running value by value and may suspend. Any
/// `Fn(T, Arc<C>, ExecutionInfo<T>) -> impl Future` implements it.
#[async_trait]
pub trait WaterfallHandler<T, C>: Send + Sync {
    async fn call(
        &self,
        value: T,
        context: Arc<C>,
        info: ExecutionInfo<T>,
    ) -> anyhow::Result<Outcome<T>>;
}

#[async_trait]
impl<T, C, F, Fut> WaterfallHandler<T, C> for F
where
    F: Fn(T, Arc<C>, ExecutionInfo<T>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Outcome<T>>> + Send,
    T: Send + 'static,
    C: Send + Sync + 'static,
{
    async fn call(
        &self,
        value: T,
        context: Arc<C>,
        info: ExecutionInfo<T>,
    ) -> anyhow::Result<Outcome<T>> {
        (self)(value, context, info).await
    }
}

/// Handler for parallel pipelines.
///
/// Runs synchronously against a draft of the payload. Edits to the draft are
/// recorded as patches once the call returns.
pub trait ParallelHandler<T, C>: Send + Sync {
    fn call(&self, draft: &mut T, context: &C, info: &ExecutionInfo<T>)
        -> anyhow::Result<Outcome<T>>;
}

impl<T, C, F> ParallelHandler<T, C> for F
where
    F: Fn(&mut T, &C, &ExecutionInfo<T>) -> anyhow::Result<Outcome<T>> + Send + Sync,
{
    fn call(
        &self,
        draft: &mut T,
        context: &C,
        info: &ExecutionInfo<T>,
    ) -> anyhow::Result<Outcome<T>> {
        (self)(draft, context, info)
    }
}

/// A named handle around a handler
pub struct Middleware<H: ?Sized> {
    id: MiddlewareId,
    name: Arc<str>,
    handler: Arc<H>,
}

pub type WaterfallMiddleware<T, C> = Middleware<dyn WaterfallHandler<T, C>>;
pub type ParallelMiddleware<T, C> = Middleware<dyn ParallelHandler<T, C>>;

impl<H: ?Sized> Middleware<H> {
    fn from_parts(name: String, handler: Arc<H>) -> Self {
        Self {
            id: MiddlewareId::new(),
            name: Arc::from(name),
            handler,
        }
    }

    pub fn id(&self) -> MiddlewareId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn reference(&self) -> MiddlewareRef {
        MiddlewareRef {
            id: self.id,
            name: Arc::clone(&self.name),
        }
    }

    /// Reject handles without an identifying name
    pub fn validate(&self) -> HookResult<()> {
        if self.name.trim().is_empty() {
            return Err(HookError::InvalidMiddlewareName);
        }
        Ok(())
    }
}

impl<H: ?Sized> Clone for Middleware<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: ?Sized> fmt::Debug for Middleware<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl<T: 'static, C: 'static> Middleware<dyn WaterfallHandler<T, C>> {
    /// Wrap a function or closure under an explicit name
    pub fn named<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(T, Arc<C>, ExecutionInfo<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Outcome<T>>> + Send + 'static,
        T: Send,
        C: Send + Sync,
    {
        Self::from_parts(name.into(), Arc::new(f))
    }

    /// Wrap a function item, taking its name from the item path.
    ///
    /// Closures have no resolvable name; registering one fails with
    /// [`HookError::InvalidMiddlewareName`].
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<C>, ExecutionInfo<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Outcome<T>>> + Send + 'static,
        T: Send,
        C: Send + Sync,
    {
        Self::from_parts(resolve_fn_name::<F>(), Arc::new(f))
    }

    /// Wrap a handler type under an explicit name
    pub fn with_handler(name: impl Into<String>, handler: impl WaterfallHandler<T, C> + 'static) -> Self {
        Self::from_parts(name.into(), Arc::new(handler))
    }
}

impl<T: 'static, C: 'static> Middleware<dyn ParallelHandler<T, C>> {
    /// Wrap a function or closure under an explicit name
    pub fn named<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut T, &C, &ExecutionInfo<T>) -> anyhow::Result<Outcome<T>> + Send + Sync + 'static,
    {
        Self::from_parts(name.into(), Arc::new(f))
    }

    /// Wrap a function item, taking its name from the item path
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut T, &C, &ExecutionInfo<T>) -> anyhow::Result<Outcome<T>> + Send + Sync + 'static,
    {
        Self::from_parts(resolve_fn_name::<F>(), Arc::new(f))
    }

    /// Wrap a handler type under an explicit name
    pub fn with_handler(name: impl Into<String>, handler: impl ParallelHandler<T, C> + 'static) -> Self {
        Self::from_parts(name.into(), Arc::new(handler))
    }
}

/// Last path segment of a function item's type name, or empty for closures
fn resolve_fn_name<F>() -> String {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") {
        return String::new();
    }
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or_default()
        .to_string()
}
