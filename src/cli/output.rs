//! CLI output formatting

use crate::builtin::{Operation, RunReport};
use crate::core::{Patch, PatchOp};
use console::Emoji;
use serde_json::Value;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a run report for display
pub fn format_report(report: &RunReport) -> String {
    let mut lines = Vec::new();

    if report.succeeded() {
        lines.push(format!(
            "{} {} ({}) {}",
            CHECK,
            style(&report.pipeline).bold(),
            report.kind,
            style("completed").green()
        ));
    } else {
        lines.push(format!(
            "{} {} ({}) {}",
            CROSS,
            style(&report.pipeline).bold(),
            report.kind,
            style("failed").red()
        ));
    }

    lines.push(format!(
        "  Started: {}",
        style(report.started_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")).dim()
    ));
    lines.push(format!(
        "  Duration: {}",
        style(format_duration_ms(report.duration_ms)).dim()
    ));
    lines.push(format!(
        "  Handled: {}  Ignored: {}",
        style(report.handled).cyan(),
        style(report.ignored).dim()
    ));

    if let Some(value) = &report.value {
        lines.push(format!("  Value: {}", format_value(value)));
    }
    if let Some(finished) = &report.finished_value {
        if report.value.as_ref() != Some(finished) {
            lines.push(format!("  Finished with: {}", format_value(finished)));
        }
    }
    if !report.patches.is_empty() {
        lines.push(format!("  Patches ({}):", report.patches.len()));
        for patch in &report.patches {
            lines.push(format!("    {}", format_patch(patch)));
        }
    }
    if let Some(error) = &report.error {
        lines.push(format!("  Error: {}", style(error).red()));
    }

    lines.join("\n")
}

/// Format a patch as `op /pointer value`
pub fn format_patch(patch: &Patch) -> String {
    let op = match patch.op {
        PatchOp::Add => style("add").green(),
        PatchOp::Remove => style("remove").red(),
        PatchOp::Replace => style("replace").yellow(),
    };
    let pointer = if patch.path.is_empty() {
        "/".to_string()
    } else {
        patch.pointer()
    };
    match &patch.value {
        Some(value) => format!("{} {} {}", op, pointer, style(value).dim()),
        None => format!("{} {}", op, pointer),
    }
}

/// Compact JSON, truncated for long values
pub fn format_value(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > 200 {
        let truncated: String = rendered.chars().take(200).collect();
        format!("{}…", truncated)
    } else {
        rendered
    }
}

/// Describe a catalog operation
pub fn describe_operation(operation: Operation) -> &'static str {
    match operation {
        Operation::Set => "write `value` at `path`",
        Operation::Remove => "delete the field at `path`",
        Operation::Increment => "add `value` (default 1) to the number at `path`",
        Operation::Multiply => "multiply the number at `path` by `value`",
        Operation::Append => "push `value` onto the array at `path`",
        Operation::Finish => "end the run with `value`",
        Operation::Ignore => "decline to handle (waterfall only)",
        Operation::Exit => "end this middleware's turn",
        Operation::Fail => "fail with `message`",
        Operation::Early => "end the run with `value` through the error channel",
    }
}

fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}
