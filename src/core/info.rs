//! Execution info - the capability object handed to every middleware call

use crate::core::{MiddlewareRef, Outcome, Patch, PipelineKind};
use std::sync::{Arc, Mutex, MutexGuard};

/// Aggregate handled/ignored counts of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    /// How many middleware produced or changed a value
    pub handled: usize,
    /// How many middleware declined
    pub ignored: usize,
}

impl Counts {
    /// Counts at the start of a run: nothing handled yet
    pub fn starting(total: usize) -> Self {
        Self {
            handled: 0,
            ignored: total,
        }
    }

    /// Move one middleware from ignored to handled
    pub fn credit_handled(&mut self) {
        self.handled += 1;
        self.ignored = self.ignored.saturating_sub(1);
    }
}

/// Terminal snapshot of a run, written exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalRecord<T> {
    /// Final value, absent when the run failed
    pub value: Option<T>,
    /// Error message when the run failed
    pub error: Option<String>,
    pub handled: usize,
    pub ignored: usize,
}

impl<T> TerminalRecord<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug)]
struct RunInner<T> {
    finish_claim: Option<T>,
    terminal: Option<TerminalRecord<T>>,
    patches: Vec<Patch>,
}

/// State shared by every execution info of one run
#[derive(Debug)]
pub(crate) struct RunState<T> {
    inner: Mutex<RunInner<T>>,
}

impl<T: Clone> RunState<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(RunInner {
                finish_claim: None,
                terminal: None,
                patches: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RunInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a finish request; the first one wins
    fn claim_finish(&self, value: T) -> bool {
        let mut inner = self.lock();
        if inner.terminal.is_some() || inner.finish_claim.is_some() {
            return false;
        }
        inner.finish_claim = Some(value);
        true
    }

    pub(crate) fn take_finish_claim(&self) -> Option<T> {
        self.lock().finish_claim.take()
    }

    pub(crate) fn commit_patches(&self, patches: Vec<Patch>) {
        self.lock().patches.extend(patches);
    }

    pub(crate) fn patches(&self) -> Vec<Patch> {
        self.lock().patches.clone()
    }

    /// Write the terminal record. Later calls are ignored.
    pub(crate) fn terminate(&self, result: Result<T, String>, counts: Counts) {
        let mut inner = self.lock();
        if inner.terminal.is_some() {
            return;
        }
        let (value, error) = match result {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e)),
        };
        inner.finish_claim = None;
        inner.terminal = Some(TerminalRecord {
            value,
            error,
            handled: counts.handled,
            ignored: counts.ignored,
        });
    }

    pub(crate) fn terminal(&self) -> Option<TerminalRecord<T>> {
        self.lock().terminal.clone()
    }
}

/// Per-invocation view of a run.
///
/// Created fresh for every middleware call. Clones share the run, so an info
/// kept past the end of `exec` reports the same terminal snapshot as every
/// other info of that run.
#[derive(Debug)]
pub struct ExecutionInfo<T> {
    index: usize,
    kind: PipelineKind,
    existing: Arc<[MiddlewareRef]>,
    counts: Counts,
    run: Arc<RunState<T>>,
}

impl<T> Clone for ExecutionInfo<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            kind: self.kind,
            existing: Arc::clone(&self.existing),
            counts: self.counts,
            run: Arc::clone(&self.run),
        }
    }
}

impl<T: Clone> ExecutionInfo<T> {
    pub(crate) fn new(
        index: usize,
        kind: PipelineKind,
        existing: Arc<[MiddlewareRef]>,
        counts: Counts,
        run: Arc<RunState<T>>,
    ) -> Self {
        Self {
            index,
            kind,
            existing,
            counts,
            run,
        }
    }

    /// Position of this middleware in the ledger
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Snapshot of the full ledger
    pub fn existing(&self) -> &[MiddlewareRef] {
        &self.existing
    }

    /// Handled count: the running count until the run ends, the final count after
    pub fn handled_count(&self) -> usize {
        self.run
            .terminal()
            .map(|t| t.handled)
            .unwrap_or(self.counts.handled)
    }

    pub fn ignored_count(&self) -> usize {
        self.run
            .terminal()
            .map(|t| t.ignored)
            .unwrap_or(self.counts.ignored)
    }

    /// True once a middleware finished the run or every middleware ran
    pub fn finished(&self) -> bool {
        self.run.terminal().is_some()
    }

    pub fn finished_value(&self) -> Option<T> {
        self.run.terminal().and_then(|t| t.value)
    }

    pub fn finished_error(&self) -> Option<String> {
        self.run.terminal().and_then(|t| t.error)
    }

    pub fn terminal(&self) -> Option<TerminalRecord<T>> {
        self.run.terminal()
    }

    /// Patches committed by middleware that completed so far (parallel only)
    pub fn accumulated_patches(&self) -> Vec<Patch> {
        self.run.patches()
    }

    /// Stop the run and resolve it to `value`.
    ///
    /// Only the first call in a run takes effect; once claimed, the run ends
    /// after the current middleware returns, whatever it returns.
    pub fn finish(&self, value: T) -> Outcome<T> {
        if !self.run.claim_finish(value.clone()) {
            tracing::debug!(index = self.index, "finish already claimed, ignoring");
        }
        Outcome::Finish(value)
    }

    /// Alias of [`finish`](Self::finish)
    pub fn close_with_result(&self, value: T) -> Outcome<T> {
        self.finish(value)
    }

    /// Replace the running value and end this middleware's turn
    pub fn replace(&self, value: T) -> Outcome<T> {
        Outcome::Replace(value)
    }

    /// End this middleware's turn
    pub fn exit(&self) -> Outcome<T> {
        Outcome::Exit
    }

    /// Decline to handle. Parallel pipelines reject this at run time.
    pub fn ignore(&self) -> Outcome<T> {
        Outcome::Ignore
    }
}
