//! Output formatters for plans, reports and journal entries.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use tabsync_core::migration::RunRecord;
use tabsync_core::{MigrationPlan, RunReport};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// SQL scripts and ASCII tables
    Text,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format migration plans.
    fn format_plans(&self, plans: &[MigrationPlan]) -> String;

    /// Format the report of a batch run.
    fn format_report(&self, report: &RunReport) -> String;

    /// Format recorded runs.
    fn format_runs(&self, runs: &[RunRecord]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Plans as reviewable SQL, reports as tables.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_plans(&self, plans: &[MigrationPlan]) -> String {
        if plans.is_empty() {
            return "Nothing to do".to_string();
        }

        plans
            .iter()
            .map(format_plan_as_sql)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn format_report(&self, report: &RunReport) -> String {
        let mut output = String::new();

        if !report.planned.is_empty() {
            output.push_str(&self.format_plans(&report.planned));
            output.push_str("\n\n");
        }

        let mut rounds = Table::new();
        rounds.set_header(vec!["Round", "Deployed", "Errors"]);
        for stats in &report.rounds {
            rounds.add_row(vec![
                Cell::new(stats.round),
                Cell::new(stats.deployed),
                Cell::new(stats.errors),
            ]);
        }
        output.push_str(&rounds.to_string());

        if !report.failures.is_empty() {
            let mut failures = Table::new();
            failures.set_header(vec!["Entity", "Error"]);
            for (entity, message) in &report.failures {
                failures.add_row(vec![entity, message]);
            }
            output.push('\n');
            output.push_str(&failures.to_string());
        }

        output.push_str(&format!(
            "\nRun {}: {} deployed, {} remaining ({})",
            report.run_id,
            report.deployed,
            report.remaining.len(),
            report.stop_reason
        ));
        output
    }

    fn format_runs(&self, runs: &[RunRecord]) -> String {
        if runs.is_empty() {
            return "No recorded runs".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Run", "Started", "Entities", "Rounds", "Deployed", "Failures", "Stop", "Dry run",
        ]);
        for run in runs {
            table.add_row(vec![
                Cell::new(run.run_id_hex()),
                Cell::new(format_timestamp(run.started_at)),
                Cell::new(run.entity_count),
                Cell::new(run.rounds.len()),
                Cell::new(run.deployed()),
                Cell::new(run.failures.len()),
                Cell::new(run.stop_reason.as_deref().unwrap_or("running")),
                Cell::new(if run.dry_run { "yes" } else { "no" }),
            ]);
        }
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_plans(&self, plans: &[MigrationPlan]) -> String {
        let values: Vec<_> = plans
            .iter()
            .map(|plan| {
                let mut value = serde_json::to_value(plan).unwrap_or(serde_json::Value::Null);
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("fingerprint".to_string(), plan.fingerprint().into());
                }
                value
            })
            .collect();
        serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_report(&self, report: &RunReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_runs(&self, runs: &[RunRecord]) -> String {
        let values: Vec<_> = runs
            .iter()
            .map(|run| {
                serde_json::json!({
                    "run_id": run.run_id_hex(),
                    "started_at": run.started_at,
                    "finished_at": run.finished_at,
                    "entity_count": run.entity_count,
                    "dry_run": run.dry_run,
                    "rounds": run.rounds.iter().map(|r| serde_json::json!({
                        "round": r.round,
                        "deployed": r.deployed,
                        "errors": r.errors,
                    })).collect::<Vec<_>>(),
                    "failures": run.failures.iter().map(|f| serde_json::json!({
                        "entity": f.entity,
                        "message": f.message,
                    })).collect::<Vec<_>>(),
                    "stop_reason": run.stop_reason,
                })
            })
            .collect();
        serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Render one plan as a commented SQL script.
fn format_plan_as_sql(plan: &MigrationPlan) -> String {
    let mut lines = vec![format!(
        "-- {} ({}): {}",
        plan.entity, plan.table, plan.classification
    )];

    if let Some(trace) = &plan.error_trace {
        lines.push(format!("-- error: {}", trace));
    }
    for warning in &plan.warnings {
        lines.push(format!("-- warning: {}", warning));
    }
    for rename in &plan.rename_warnings {
        lines.push(format!("-- warning: {}", rename));
    }

    if !plan.operations.is_empty() {
        lines.push(format!("-- fingerprint: {}", plan.fingerprint()));
        lines.push(plan.script());
    }
    if !plan.follow_up.is_empty() {
        lines.push("-- follow-up (reindex):".to_string());
        lines.push(plan.follow_up_script());
    }

    lines.join("\n")
}

/// Seconds since the epoch from a microsecond timestamp.
fn format_timestamp(micros: u64) -> String {
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}
