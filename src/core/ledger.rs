//! Registration ledger - ordered, append-only until the first exec

use crate::core::{HookError, HookResult, Middleware, MiddlewareId, MiddlewareRef};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::debug;

/// Ordered list of middleware for one pipeline.
///
/// Insertion order is execution order. The first `freeze` turns the list into
/// an immutable snapshot; registrations after that fail.
pub struct Ledger<H: ?Sized> {
    entries: Mutex<Vec<Middleware<H>>>,
    frozen: OnceLock<Arc<[Middleware<H>]>>,
}

impl<H: ?Sized> Ledger<H> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            frozen: OnceLock::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Middleware<H>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a middleware and return its position
    pub fn register(&self, middleware: Middleware<H>) -> HookResult<usize> {
        middleware.validate()?;

        let mut entries = self.lock();
        if self.frozen.get().is_some() {
            return Err(HookError::PipelineFrozen {
                name: middleware.name().to_string(),
            });
        }
        entries.push(middleware);
        Ok(entries.len() - 1)
    }

    /// Freeze the ledger, returning the immutable snapshot
    pub fn freeze(&self) -> Arc<[Middleware<H>]> {
        if let Some(frozen) = self.frozen.get() {
            return Arc::clone(frozen);
        }
        let entries = self.lock();
        Arc::clone(self.frozen.get_or_init(|| {
            debug!(len = entries.len(), "Ledger frozen");
            entries.iter().cloned().collect()
        }))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// First position holding the given middleware
    pub fn index_of(&self, id: MiddlewareId) -> Option<usize> {
        self.lock().iter().position(|m| m.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current entries, in order
    pub fn entries(&self) -> Vec<Middleware<H>> {
        self.lock().clone()
    }

    pub fn references(&self) -> Vec<MiddlewareRef> {
        self.lock().iter().map(|m| m.reference()).collect()
    }
}

impl<H: ?Sized> Default for Ledger<H> {
    fn default() -> Self {
        Self::new()
    }
}
