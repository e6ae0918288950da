//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::json;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{TypeRegistry, ValidationReport};
use crate::model::{Lifecycle, ObservedState};
use crate::planner::Operation;
use crate::reconciler::{DriftReport, ReconcileSummary, ReconciliationResult};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Planned resource row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Actions")]
    actions: String,
    #[tabled(rename = "Change")]
    classification: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

/// Applied resource row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Result")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Observed resource row for table display.
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Spec hash")]
    spec_hash: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Resource type row for table display.
#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Capabilities")]
    capabilities: String,
    #[tabled(rename = "Fields")]
    fields: usize,
    #[tabled(rename = "Description")]
    description: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats check-mode results as a plan.
    #[must_use]
    pub fn format_plan(&self, summary: &ReconcileSummary, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::summary_json(summary),
            OutputFormat::Text => Self::format_plan_text(summary, detailed),
        }
    }

    fn format_plan_text(summary: &ReconcileSummary, detailed: bool) -> String {
        let mut output = String::new();

        let pending: Vec<&ReconciliationResult> = summary.results.iter().filter(|r| r.changed).collect();
        if pending.is_empty() && summary.errors.is_empty() {
            let _ = writeln!(
                output,
                "{} No changes required - resources are up to date.",
                "✓".green()
            );
            return output;
        }

        if !pending.is_empty() {
            let _ = writeln!(output, "\nAction plan\n");
            let rows: Vec<PlanRow> = pending
                .iter()
                .enumerate()
                .map(|(i, r)| PlanRow {
                    index: i + 1,
                    resource: r.resource.key(),
                    actions: r
                        .actions
                        .iter()
                        .map(|s| Self::format_operation(s.operation))
                        .collect::<Vec<_>>()
                        .join(" "),
                    classification: r.classification.to_string(),
                    fields: Self::truncate(&r.diff.changed_fields().join(", "), 40),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if detailed {
            for result in &pending {
                let changed: Vec<_> = result.diff.changed().collect();
                if changed.is_empty() {
                    continue;
                }
                let _ = writeln!(output, "\n{}:", result.resource.key().bold());
                for field in changed {
                    let before = field
                        .before
                        .as_ref()
                        .map_or_else(|| String::from("(unset)"), ToString::to_string);
                    let _ = writeln!(
                        output,
                        "   {} {}: {} -> {} ({})",
                        "~".yellow(),
                        field.field,
                        before.red(),
                        field.after.to_string().green(),
                        field.requires
                    );
                }
            }
        }

        Self::write_errors(&mut output, summary);

        let _ = write!(
            output,
            "\nPlan: {} to change, {} unchanged",
            pending.len().to_string().yellow(),
            summary.results.len() - pending.len()
        );
        if !summary.errors.is_empty() {
            let _ = write!(output, ", {} failed", summary.errors.len().to_string().red());
        }
        output.push('\n');
        output
    }

    /// Formats the results of an apply or destroy run.
    #[must_use]
    pub fn format_summary(&self, summary: &ReconcileSummary) -> String {
        match self.format {
            OutputFormat::Json => Self::summary_json(summary),
            OutputFormat::Text => {
                let mut output = String::new();
                let rows: Vec<ResultRow> = summary
                    .results
                    .iter()
                    .map(|r| ResultRow {
                        resource: r.resource.key(),
                        status: Self::format_result_status(r),
                        message: Self::truncate(&r.message(), 60),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                Self::write_errors(&mut output, summary);

                let status = if summary.is_success() {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation failed", "✗".red())
                };
                let _ = writeln!(output, "\n{status}");
                let _ = writeln!(output, "   Changed: {}", summary.changed_count());
                let _ = writeln!(output, "   Failed: {}", summary.failed_count());
                if !summary.skipped.is_empty() {
                    let _ = writeln!(output, "   Skipped: {}", summary.skipped.len());
                }
                output
            }
        }
    }

    fn write_errors(output: &mut String, summary: &ReconcileSummary) {
        if summary.errors.is_empty() {
            return;
        }
        let _ = write!(output, "\n{} Errors:\n", "!".yellow());
        for failure in &summary.errors {
            let _ = writeln!(output, "   - {}: {}", failure.resource.key(), failure.message);
        }
    }

    fn summary_json(summary: &ReconcileSummary) -> String {
        let value = json!({
            "changed": summary.changed_count() > 0,
            "failed": !summary.is_success(),
            "results": summary
                .results
                .iter()
                .map(|r| {
                    let mut output = r.module_output();
                    output["name"] = json!(r.resource.key());
                    output
                })
                .collect::<Vec<_>>(),
            "errors": summary.errors,
            "skipped": summary.skipped,
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }
                let mut output = format!("{} Drift detected:\n\n", "!".yellow());
                for entry in &report.drifted {
                    let _ = writeln!(
                        output,
                        "   - {} ({}): {}",
                        entry.resource.key(),
                        entry.classification,
                        entry
                            .actions
                            .iter()
                            .map(|op| Self::format_operation(*op))
                            .collect::<Vec<_>>()
                            .join(" ")
                    );
                    if !entry.fields.is_empty() {
                        let _ = writeln!(output, "       fields: {}", entry.fields.join(", "));
                    }
                }
                let _ = write!(
                    output,
                    "\n{}/{} resources have drifted.\n",
                    report.drifted.len(),
                    report.total_resources
                );
                output
            }
        }
    }

    /// Formats observed resources.
    #[must_use]
    pub fn format_status(&self, resources: &[ObservedState], detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(resources).unwrap_or_default(),
            OutputFormat::Text => {
                if resources.is_empty() {
                    return String::from("   No resources found.\n");
                }

                let rows: Vec<StatusRow> = resources
                    .iter()
                    .map(|r| StatusRow {
                        kind: r.resource.kind.clone(),
                        name: r.resource.name.clone(),
                        state: Self::format_lifecycle(r.lifecycle),
                        spec_hash: r
                            .spec_hash
                            .as_deref()
                            .map_or_else(|| String::from("-"), |h| Self::truncate(h, 12)),
                        id: r.backend_id.clone().unwrap_or_default(),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');

                if detailed {
                    for resource in resources {
                        let _ = writeln!(output, "\n{}:", resource.resource.key().bold());
                        for (field, value) in &resource.fields {
                            let _ = writeln!(output, "   {field}: {value}");
                        }
                    }
                }

                let running = resources.iter().filter(|r| r.lifecycle.is_running()).count();
                let _ = write!(
                    output,
                    "\n{} resource(s), {} running\n",
                    resources.len(),
                    running
                );
                output
            }
        }
    }

    /// Formats the type registry.
    #[must_use]
    pub fn format_types(&self, registry: &TypeRegistry) -> String {
        match self.format {
            OutputFormat::Json => {
                let types: Vec<_> = registry.iter().collect();
                serde_json::to_string_pretty(&types).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<TypeRow> = registry
                    .iter()
                    .map(|t| {
                        let caps = &t.capabilities;
                        let capabilities: Vec<&str> = [
                            (caps.start, "start"),
                            (caps.stop, "stop"),
                            (caps.update, "update"),
                            (caps.remove, "remove"),
                        ]
                        .into_iter()
                        .filter_map(|(enabled, name)| enabled.then_some(name))
                        .collect();
                        TypeRow {
                            kind: t.kind.clone(),
                            capabilities: capabilities.join(", "),
                            fields: t.fields.len(),
                            description: Self::truncate(t.description.as_deref().unwrap_or(""), 50),
                        }
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation report.
    #[must_use]
    pub fn format_validation(&self, report: &ValidationReport, show_warnings: bool, resources: usize) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({
                    "valid": report.is_valid(),
                    "resources": resources,
                    "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": report.warnings,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if report.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
                    for issue in &report.errors {
                        let _ = writeln!(output, "   - {issue}");
                    }
                }
                if show_warnings && !report.warnings.is_empty() {
                    let _ = writeln!(output, "\nWarnings:");
                    for warning in &report.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                let _ = writeln!(output, "\nResources: {resources}");
                output
            }
        }
    }

    /// Formats an operation with color.
    fn format_operation(operation: Operation) -> String {
        match operation {
            Operation::Create => "+create".green().to_string(),
            Operation::Start => "start".green().to_string(),
            Operation::Update => "~update".yellow().to_string(),
            Operation::Stop => "stop".yellow().to_string(),
            Operation::Remove => "-remove".red().to_string(),
        }
    }

    /// Formats a lifecycle with color.
    fn format_lifecycle(lifecycle: Lifecycle) -> String {
        let text = lifecycle.to_string();
        match lifecycle {
            Lifecycle::Running => text.green().to_string(),
            Lifecycle::Created | Lifecycle::Stopped | Lifecycle::Restarting => text.yellow().to_string(),
            Lifecycle::Removing => text.red().to_string(),
            Lifecycle::Absent => text.dimmed().to_string(),
        }
    }

    fn format_result_status(result: &ReconciliationResult) -> String {
        match (result.is_failed(), result.changed, result.dry_run) {
            (true, _, _) => "failed".red().to_string(),
            (false, true, true) => "would change".yellow().to_string(),
            (false, true, false) => "changed".yellow().to_string(),
            (false, false, _) => "ok".green().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &format!("{} {message}", "✓".green()), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &format!("{} {message}", "✗".red()), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &format!("{} {message}", "!".yellow()), message)
    }

    fn message(&self, status: &str, text: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&json!({ "status": status, "message": message }))
                    .unwrap_or_default()
            }
            OutputFormat::Text => text.to_string(),
        }
    }
}
