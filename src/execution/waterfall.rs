//! Waterfall engine - sequential accumulate-or-pass-through pipeline

use crate::core::outcome::take_early_result;
use crate::core::{
    Counts, ExecutionInfo, FactoryContext, HookError, HookOptions, HookResult, HookSide, Ledger,
    MiddlewareRef, Outcome, PipelineKind, RunState, TerminalRecord, WaterfallHandler,
    WaterfallMiddleware,
};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Result of registering a middleware
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    /// First position of the middleware in the shared registration list
    pub index: usize,
    /// Every middleware registered through the shared context so far
    pub existing: Vec<MiddlewareRef>,
}

/// What to do with the running value after one middleware returned
enum Step<T> {
    Continue { value: T, handled: bool },
    Finish(T),
}

/// Sequential pipeline: each middleware receives the value produced by the
/// previous one, and the run resolves to the last produced value.
pub struct Waterfall<T, C> {
    ledger: Ledger<dyn WaterfallHandler<T, C>>,
    factory: Arc<FactoryContext<T, C>>,
    return_on_first: bool,
    last_run: Mutex<Option<Arc<RunState<T>>>>,
}

impl<T, C> Waterfall<T, C>
where
    T: Clone + Debug + Send + Sync + 'static,
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
    pub fn register(&self, middleware: WaterfallMiddleware<T, C>) -> HookResult<RegisterInfo> {
        let reference = middleware.reference();
        self.ledger.register(middleware)?;
        self.factory.on_register(reference.clone());
        debug!(middleware = %reference.name, "Registered waterfall middleware");

        Ok(RegisterInfo {
            index: self.factory.get_handler_index(reference.id).unwrap_or_default(),
            existing: self.factory.middleware_list(),
        })
    }

    /// First ledger position of the middleware, by identity
    pub fn get_handler_index(&self, middleware: &WaterfallMiddleware<T, C>) -> Option<usize> {
        self.ledger.index_of(middleware.id())
    }

    pub fn listeners(&self) -> Vec<WaterfallMiddleware<T, C>> {
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

    /// Thread `initial` through every middleware and resolve to the result
    pub async fn exec(&self, initial: T, context: C) -> HookResult<T> {
        let entries = self.ledger.freeze();
        self.factory.admit()?;

        let run = RunState::new();
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&run));

        let context = Arc::new(context);
        let existing: Arc<[MiddlewareRef]> = entries.iter().map(|m| m.reference()).collect();
        let mut counts = Counts::starting(entries.len());
        let mut value = initial;

        info!(
            context = %self.factory.id(),
            middleware = entries.len(),
            "Starting waterfall run"
        );

        for (index, middleware) in entries.iter().enumerate() {
            let reference = &existing[index];
            let info = ExecutionInfo::new(
                index,
                PipelineKind::Waterfall,
                Arc::clone(&existing),
                counts,
                Arc::clone(&run),
            );

            let current = self
                .factory
                .instrument(HookSide::Start, value, reference, &context)
                .await;

            debug!(index, middleware = %reference.name, "Executing waterfall middleware");
            let result = middleware
                .handler()
                .call(current.clone(), Arc::clone(&context), info)
                .await;

            let step = match self.resolve(&run, reference, current, result) {
                Ok(step) => step,
                Err(error) => return Err(self.fail(&run, counts, error)),
            };

            match step {
                Step::Finish(result) => {
                    counts.credit_handled();
                    debug!(index, middleware = %reference.name, "Run finished early");
                    return self.complete(&run, counts, result);
                }
                Step::Continue { value: next, handled } => {
                    if handled {
                        counts.credit_handled();
                    }
                    value = self
                        .factory
                        .instrument(HookSide::End, next, reference, &context)
                        .await;
                }
            }
        }

        self.complete(&run, counts, value)
    }

    /// Turn a middleware result into the next step for the run
    fn resolve(
        &self,
        run: &RunState<T>,
        reference: &MiddlewareRef,
        current: T,
        result: anyhow::Result<Outcome<T>>,
    ) -> HookResult<Step<T>> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => match take_early_result::<T>(err) {
                Ok(value) => Outcome::Finish(value),
                Err(source) => {
                    warn!(middleware = %reference.name, error = %source, "Waterfall middleware failed");
                    return Err(HookError::Middleware {
                        name: reference.name.to_string(),
                        source,
                    });
                }
            },
        };

        if let Some(claimed) = run.take_finish_claim() {
            return Ok(Step::Finish(claimed));
        }

        let step = match outcome {
            Outcome::Finish(value) => Step::Finish(value),
            Outcome::Value(value) | Outcome::Replace(value) if self.return_on_first => {
                Step::Finish(value)
            }
            Outcome::Value(value) | Outcome::Replace(value) => Step::Continue {
                value,
                handled: true,
            },
            Outcome::Exit => Step::Continue {
                value: current,
                handled: true,
            },
            Outcome::Pass | Outcome::Ignore => Step::Continue {
                value: current,
                handled: false,
            },
        };
        Ok(step)
    }

    /// Validate the settled value and close the run
    fn complete(&self, run: &RunState<T>, counts: Counts, value: T) -> HookResult<T> {
        if let Err(error) = self.factory.validate(&value) {
            return Err(self.fail(run, counts, error));
        }

        run.terminate(Ok(value.clone()), counts);
        self.factory.complete_execution();
        info!(
            handled = counts.handled,
            ignored = counts.ignored,
            "Waterfall run completed"
        );
        Ok(value)
    }

    fn fail(&self, run: &RunState<T>, counts: Counts, error: HookError) -> HookError {
        run.terminate(Err(error.to_string()), counts);
        self.factory.complete_execution();
        error
    }
}

impl<T, C> Default for Waterfall<T, C>
where
    T: Clone + Debug + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(HookOptions::default())
    }
}
