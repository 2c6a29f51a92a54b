//! Running built pipelines and summarizing the result

use crate::builtin::definition::BuiltPipeline;
use crate::core::{Patch, PipelineKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::info;

/// Summary of one run, suitable for printing or JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline: String,
    pub kind: PipelineKind,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Resolved value (waterfall) or the payload after commit (parallel)
    pub value: Option<Value>,

    /// Terminal value recorded by the engine, which differs from `value`
    /// when a parallel run was finished with an explicit value
    pub finished_value: Option<Value>,

    pub error: Option<String>,
    pub handled: usize,
    pub ignored: usize,

    /// Committed patches (parallel only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl BuiltPipeline {
    /// Run once and report. Failures are captured in the report.
    pub async fn run(&self, name: &str, initial: Value, context: Value) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let (result, terminal, patches) = match self {
            BuiltPipeline::Waterfall(hook) => {
                let result = hook.exec(initial, context).await;
                (result, hook.last_terminal(), Vec::new())
            }
            BuiltPipeline::Parallel(hook) => {
                let mut payload = initial;
                let result = hook.exec(&mut payload, context).map(|()| payload);
                (result, hook.last_terminal(), hook.last_patches())
            }
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        let (handled, ignored) = terminal
            .as_ref()
            .map(|t| (t.handled, t.ignored))
            .unwrap_or((0, self.len()));

        let report = match result {
            Ok(value) => RunReport {
                pipeline: name.to_string(),
                kind: self.kind(),
                started_at,
                duration_ms,
                value: Some(value),
                finished_value: terminal.and_then(|t| t.value),
                error: None,
                handled,
                ignored,
                patches,
            },
            Err(error) => RunReport {
                pipeline: name.to_string(),
                kind: self.kind(),
                started_at,
                duration_ms,
                value: None,
                finished_value: None,
                error: Some(format!("{:#}", anyhow::Error::from(error))),
                handled,
                ignored,
                patches,
            },
        };

        info!(
            pipeline = name,
            handled = report.handled,
            ignored = report.ignored,
            duration_ms,
            "Run finished"
        );
        report
    }

    /// Run up to `times` times (at least once), stopping after the first failure
    pub async fn run_repeated(
        &self,
        name: &str,
        initial: &Value,
        context: &Value,
        times: usize,
    ) -> Vec<RunReport> {
        let mut reports = Vec::new();
        for _ in 0..times.max(1) {
            let report = self.run(name, initial.clone(), context.clone()).await;
            let failed = !report.succeeded();
            reports.push(report);
            if failed {
                break;
            }
        }
        reports
    }
}
