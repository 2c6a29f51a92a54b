//! Parallel engine - independent observers over a tracked draft
//!
//! Every middleware gets its own draft cloned from the pristine payload. When
//! the call completes, the draft is diffed against the payload and the
//! resulting patches join the run's list. The payload itself is written once,
//! after the last middleware ran or the run finished early.

use crate::core::outcome::take_early_result;
use crate::core::patch;
use crate::core::{
    Counts, ExecutionInfo, FactoryContext, HookError, HookOptions, HookResult, HookSide, Ledger,
    MiddlewareRef, Outcome, ParallelHandler, ParallelMiddleware, Patch, PipelineKind, RunState,
    TerminalRecord,
};
use crate::execution::RegisterInfo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Fan-out pipeline. Middleware run one after another in ledger order, but
/// none of them sees what the others did.
pub struct Parallel<T, C> {
    ledger: Ledger<dyn ParallelHandler<T, C>>,
    factory: Arc<FactoryContext<T, C>>,
    return_on_first: bool,
    last_run: Mutex<Option<Arc<RunState<T>>>>,
}

impl<T, C> Parallel<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Create a standalone pipeline with its own factory context
    pub fn new(options: HookOptions<T, C>) -> Self {
        let return_on_first = options.return_on_first;
        Self::with_factory(FactoryContext::new(options), return_on_first)
    }

    /// Create a pipeline sharing an existing factory context
    pub fn with_factory(factory: Arc<FactoryContext<T, C>>, return_on_first: bool) -> Self {
        Self {
            ledger: Ledger::new(),
            factory,
            return_on_first,
            last_run: Mutex::new(None),
        }
    }

    pub fn factory(&self) -> &Arc<FactoryContext<T, C>> {
        &self.factory
    }

    pub fn return_on_first(&self) -> bool {
        self.return_on_first
    }

    /// Append a middleware to the pipeline
    pub fn register(&self, middleware: ParallelMiddleware<T, C>) -> HookResult<RegisterInfo> {
        let reference = middleware.reference();
        self.ledger.register(middleware)?;
        self.factory.on_register(reference.clone());
        debug!(middleware = %reference.name, "Registered parallel middleware");

        Ok(RegisterInfo {
            index: self.factory.get_handler_index(reference.id).unwrap_or_default(),
            existing: self.factory.middleware_list(),
        })
    }

    /// First ledger position of the middleware, by identity
    pub fn get_handler_index(&self, middleware: &ParallelMiddleware<T, C>) -> Option<usize> {
        self.ledger.index_of(middleware.id())
    }

    pub fn listeners(&self) -> Vec<ParallelMiddleware<T, C>> {
        self.ledger.entries()
    }

    pub fn is_frozen(&self) -> bool {
        self.ledger.is_frozen()
    }

    /// Terminal record of the most recent run
    pub fn last_terminal(&self) -> Option<TerminalRecord<T>> {
        let last = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref().and_then(|run| run.terminal())
    }

    /// Patches committed by the most recent run
    pub fn last_patches(&self) -> Vec<Patch> {
        let last = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref().map(|run| run.patches()).unwrap_or_default()
    }

    /// Run every middleware against `payload`, then apply their edits to it
    pub fn exec(&self, payload: &mut T, context: C) -> HookResult<()> {
        let entries = self.ledger.freeze();
        self.factory.admit()?;

        let run = RunState::new();
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&run));

        let context = Arc::new(context);
        let existing: Arc<[MiddlewareRef]> = entries.iter().map(|m| m.reference()).collect();
        let mut counts = Counts::starting(entries.len());

        info!(
            context = %self.factory.id(),
            middleware = entries.len(),
            "Starting parallel run"
        );

        let result = self.drive(&entries, &existing, &run, &context, payload, &mut counts);
        self.factory.complete_execution();

        let result = result.and_then(|finished| {
            let value = finished.unwrap_or_else(|| payload.clone());
            self.factory.validate(&value)?;
            Ok(value)
        });

        match result {
            Ok(value) => {
                run.terminate(Ok(value), counts);
                info!(
                    handled = counts.handled,
                    ignored = counts.ignored,
                    patches = run.patches().len(),
                    "Parallel run completed"
                );
                Ok(())
            }
            Err(error) => {
                run.terminate(Err(error.to_string()), counts);
                Err(error)
            }
        }
    }

    /// Walk the ledger and commit whatever was accumulated, even on failure.
    /// Returns the finish value when the run ended early.
    fn drive(
        &self,
        entries: &[ParallelMiddleware<T, C>],
        existing: &Arc<[MiddlewareRef]>,
        run: &Arc<RunState<T>>,
        context: &Arc<C>,
        payload: &mut T,
        counts: &mut Counts,
    ) -> HookResult<Option<T>> {
        let pristine = payload.clone();
        let base = serde_json::to_value(&pristine)?;

        let walked = self.walk(entries, existing, run, context, &pristine, &base, counts);
        let committed = commit(payload, &base, &run.patches());

        let finished = walked?;
        committed?;
        Ok(finished)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        entries: &[ParallelMiddleware<T, C>],
        existing: &Arc<[MiddlewareRef]>,
        run: &Arc<RunState<T>>,
        context: &Arc<C>,
        pristine: &T,
        base: &Value,
        counts: &mut Counts,
    ) -> HookResult<Option<T>> {
        for (index, middleware) in entries.iter().enumerate() {
            let reference = &existing[index];
            let info = ExecutionInfo::new(
                index,
                PipelineKind::Parallel,
                Arc::clone(existing),
                *counts,
                Arc::clone(run),
            );

            let mut draft =
                self.factory
                    .instrument_sync(HookSide::Start, pristine.clone(), reference, context)?;

            debug!(index, middleware = %reference.name, "Executing parallel middleware");
            let result = middleware.handler().call(&mut draft, context.as_ref(), &info);

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => match take_early_result::<T>(err) {
                    Ok(value) => Outcome::Finish(value),
                    Err(source) => {
                        warn!(middleware = %reference.name, error = %source, "Parallel middleware failed");
                        return Err(HookError::Middleware {
                            name: reference.name.to_string(),
                            source,
                        });
                    }
                },
            };

            let finish_with = match (run.take_finish_claim(), outcome) {
                (Some(claimed), _) => Some(claimed),
                (None, Outcome::Finish(value)) => Some(value),
                (None, Outcome::Ignore) => {
                    return Err(HookError::UnsupportedControl {
                        kind: PipelineKind::Parallel,
                        control: "ignore",
                    });
                }
                (None, Outcome::Exit) => {
                    // Edits made before exiting are dropped
                    draft = pristine.clone();
                    None
                }
                (None, Outcome::Replace(value)) => {
                    draft = value;
                    None
                }
                (None, Outcome::Pass) | (None, Outcome::Value(_)) => None,
            };

            // The finishing middleware never completed, so its edits are dropped
            if let Some(value) = finish_with {
                counts.credit_handled();
                debug!(index, middleware = %reference.name, "Run finished early");
                return Ok(Some(value));
            }

            let produced =
                self.factory
                    .instrument_sync(HookSide::End, draft, reference, context)?;
            let patches = patch::diff(base, &serde_json::to_value(&produced)?);
            if patches.is_empty() {
                continue;
            }

            debug!(
                index,
                middleware = %reference.name,
                patches = patches.len(),
                "Committing middleware patches"
            );
            run.commit_patches(patches);
            counts.credit_handled();

            if self.return_on_first {
                return Ok(Some(produced));
            }
        }

        Ok(None)
    }
}

/// Write the accumulated patches onto the payload in one step. A patch whose
/// path was removed by an earlier middleware is skipped, the rest still land.
fn commit<T>(payload: &mut T, base: &Value, patches: &[Patch]) -> HookResult<()>
where
    T: DeserializeOwned,
{
    if patches.is_empty() {
        return Ok(());
    }
    let mut target = base.clone();
    for skipped in patch::apply_resolvable(&mut target, patches) {
        warn!(error = %skipped, "Skipping patch that no longer resolves");
    }
    *payload = serde_json::from_value(target)?;
    Ok(())
}

impl<T, C> Default for Parallel<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(HookOptions::default())
    }
}
