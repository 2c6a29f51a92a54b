//! Hook factory - pipelines sharing one factory context

use crate::core::{FactoryContext, HookOptions};
use crate::execution::{Parallel, Waterfall};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

/// Builds pipelines that share registration bookkeeping, execution counters
/// and instrumentation hooks.
///
/// ```no_run
/// # use hookflow::prelude::*;
/// let hooks = Hooks::<i64, ()>::new(HookOptions::new().with_executions_count_limit(1));
/// let first = hooks.waterfall();
/// let second = hooks.waterfall();
/// // A run on `first` uses up the limit for `second` too
/// ```
pub struct Hooks<T, C> {
    factory: Arc<FactoryContext<T, C>>,
    return_on_first: bool,
}

impl<T, C> Hooks<T, C> {
    pub fn new(options: HookOptions<T, C>) -> Self {
        let return_on_first = options.return_on_first;
        Self {
            factory: FactoryContext::new(options),
            return_on_first,
        }
    }

    pub fn context(&self) -> &Arc<FactoryContext<T, C>> {
        &self.factory
    }

    /// Override `return_on_first` for pipelines built after this call
    pub fn with_return_on_first(mut self, return_on_first: bool) -> Self {
        self.return_on_first = return_on_first;
        self
    }
}

impl<T, C> Hooks<T, C>
where
    T: Clone + Debug + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn waterfall(&self) -> Waterfall<T, C> {
        Waterfall::with_factory(Arc::clone(&self.factory), self.return_on_first)
    }
}

impl<T, C> Hooks<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn parallel(&self) -> Parallel<T, C> {
        Parallel::with_factory(Arc::clone(&self.factory), self.return_on_first)
    }
}

impl<T, C> Default for Hooks<T, C> {
    fn default() -> Self {
        Self::new(HookOptions::default())
    }
}
