//! Factory context - bookkeeping shared by every pipeline built from it

use crate::core::{
    ExecHook, ExecPayload, HookError, HookOptions, HookResult, HookReturn, MiddlewareId,
    MiddlewareRef, PipelineKind, ShapeValidator,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared execution counters, admission limit, instrumentation hooks and the
/// registration list of every pipeline built from one factory
pub struct FactoryContext<T, C> {
    id: Uuid,
    executions_count_limit: usize,
    last_execution_start_count: AtomicUsize,
    last_execution_end_count: AtomicUsize,
    middleware_list: Mutex<Vec<MiddlewareRef>>,
    on_exec_start: Option<ExecHook<T, C>>,
    on_exec_end: Option<ExecHook<T, C>>,
    validator: Option<Arc<dyn ShapeValidator<T>>>,
}

impl<T, C> fmt::Debug for FactoryContext<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryContext")
            .field("id", &self.id)
            .field("executions_count_limit", &self.executions_count_limit)
            .field("last_execution_start_count", &self.last_execution_start_count())
            .field("last_execution_end_count", &self.last_execution_end_count())
            .finish_non_exhaustive()
    }
}

impl<T, C> FactoryContext<T, C> {
    /// Create a context from the options. The pipeline-level part of the
    /// options (`return_on_first`) is left to the caller.
    pub fn new(options: HookOptions<T, C>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            executions_count_limit: options.executions_count_limit.unwrap_or(usize::MAX),
            last_execution_start_count: AtomicUsize::new(0),
            last_execution_end_count: AtomicUsize::new(0),
            middleware_list: Mutex::new(Vec::new()),
            on_exec_start: options.on_exec_start,
            on_exec_end: options.on_exec_end,
            validator: options.validator,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn executions_count_limit(&self) -> usize {
        self.executions_count_limit
    }

    pub fn last_execution_start_count(&self) -> usize {
        self.last_execution_start_count.load(Ordering::SeqCst)
    }

    pub fn last_execution_end_count(&self) -> usize {
        self.last_execution_end_count.load(Ordering::SeqCst)
    }

    fn list(&self) -> MutexGuard<'_, Vec<MiddlewareRef>> {
        self.middleware_list.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every middleware registered through pipelines of this context, in order
    pub fn middleware_list(&self) -> Vec<MiddlewareRef> {
        self.list().clone()
    }

    /// First position of the middleware in the shared list
    pub fn get_handler_index(&self, id: MiddlewareId) -> Option<usize> {
        self.list().iter().position(|m| m.id == id)
    }

    pub(crate) fn on_register(&self, middleware: MiddlewareRef) -> usize {
        let mut list = self.list();
        list.push(middleware);
        list.len() - 1
    }

    /// Admission control: check the limit and bump the start count in one step
    pub(crate) fn admit(&self) -> HookResult<usize> {
        let limit = self.executions_count_limit;
        self.last_execution_start_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current + 1;
                (next <= limit).then_some(next)
            })
            .map(|previous| previous + 1)
            .map_err(|current| {
                warn!(context = %self.id, limit, "Execution limit reached");
                HookError::ExecutionLimitExceeded {
                    limit,
                    next: current + 1,
                }
            })
    }

    pub(crate) fn complete_execution(&self) {
        self.last_execution_end_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Check the value a run settled on
    pub(crate) fn validate(&self, value: &T) -> HookResult<()> {
        match &self.validator {
            Some(validator) => validator
                .validate(value)
                .map_err(|reason| HookError::ShapeValidation { reason }),
            None => Ok(()),
        }
    }
}

/// Which side of the middleware call a hook runs on
#[derive(Debug, Clone, Copy)]
pub(crate) enum HookSide {
    Start,
    End,
}

impl<T, C> FactoryContext<T, C> {
    fn hook(&self, side: HookSide) -> Option<&ExecHook<T, C>> {
        match side {
            HookSide::Start => self.on_exec_start.as_ref(),
            HookSide::End => self.on_exec_end.as_ref(),
        }
    }

    /// Run a hook for a waterfall call, awaiting deferred results
    pub(crate) async fn instrument(
        &self,
        side: HookSide,
        current: T,
        middleware: &MiddlewareRef,
        context: &Arc<C>,
    ) -> T
    where
        T: Clone,
    {
        let Some(hook) = self.hook(side) else {
            return current;
        };
        let payload = ExecPayload {
            kind: PipelineKind::Waterfall,
            current: current.clone(),
            middleware: middleware.clone(),
            context: Arc::clone(context),
        };
        match hook(payload) {
            HookReturn::Keep => current,
            HookReturn::Replace(value) => value,
            HookReturn::Deferred(pending) => {
                debug!(?side, middleware = %middleware.name, "Awaiting deferred hook");
                pending.await.unwrap_or(current)
            }
        }
    }

    /// Run a hook for a parallel call; deferred results are rejected
    pub(crate) fn instrument_sync(
        &self,
        side: HookSide,
        current: T,
        middleware: &MiddlewareRef,
        context: &Arc<C>,
    ) -> HookResult<T>
    where
        T: Clone,
    {
        let Some(hook) = self.hook(side) else {
            return Ok(current);
        };
        let payload = ExecPayload {
            kind: PipelineKind::Parallel,
            current: current.clone(),
            middleware: middleware.clone(),
            context: Arc::clone(context),
        };
        match hook(payload) {
            HookReturn::Keep => Ok(current),
            HookReturn::Replace(value) => Ok(value),
            HookReturn::Deferred(_) => Err(HookError::DeferredHook {
                kind: PipelineKind::Parallel,
            }),
        }
    }
}
