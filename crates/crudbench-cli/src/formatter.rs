//! Output formatters for benchmark reports.

use clap::ValueEnum;
use comfy_table::{Cell, CellAlignment, Table};
use crudbench_core::{KindSummary, Report, ReportRow};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the per-model, per-kind latency summary.
    fn format_summary(&self, summary: &[KindSummary]) -> String;

    /// Format one row per execution.
    fn format_rows(&self, rows: &[ReportRow]) -> String;

    /// Format the plans captured during the run.
    fn format_plans(&self, report: &Report) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

fn millis(duration: std::time::Duration) -> String {
    format!("{:.3}", duration.as_secs_f64() * 1000.0)
}

/// `(index, model, kind, plan)` for every execution that captured a plan.
fn plans(report: &Report) -> Vec<(usize, &str, String, String)> {
    report
        .results()
        .iter()
        .enumerate()
        .filter_map(|(i, result)| {
            result.plan().map(|plan| {
                (
                    i,
                    result.model_name(),
                    result.kind().to_string(),
                    plan.to_string(),
                )
            })
        })
        .collect()
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_summary(&self, summary: &[KindSummary]) -> String {
        if summary.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "model", "operation", "runs", "errors", "mean ms", "p50 ms", "p99 ms", "min ms",
            "max ms",
        ]);

        for entry in summary {
            let mut row = vec![
                Cell::new(&entry.model_name),
                Cell::new(entry.kind),
                Cell::new(entry.executions).set_alignment(CellAlignment::Right),
                Cell::new(entry.errors).set_alignment(CellAlignment::Right),
            ];
            for duration in [entry.mean, entry.p50, entry.p99, entry.min, entry.max] {
                row.push(Cell::new(millis(duration)).set_alignment(CellAlignment::Right));
            }
            table.add_row(row);
        }

        table.to_string()
    }

    fn format_rows(&self, rows: &[ReportRow]) -> String {
        if rows.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "model", "operation", "duration ms", "count", "error"]);

        for (i, row) in rows.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i),
                Cell::new(&row.model_name),
                Cell::new(row.operation_kind),
                Cell::new(millis(row.duration)).set_alignment(CellAlignment::Right),
                Cell::new(
                    row.row_or_doc_count
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                )
                .set_alignment(CellAlignment::Right),
                Cell::new(row.error.as_deref().unwrap_or("")),
            ]);
        }

        table.to_string()
    }

    fn format_plans(&self, report: &Report) -> String {
        let plans = plans(report);
        if plans.is_empty() {
            return "No plans captured".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "model", "operation", "plan"]);
        for (i, model, kind, plan) in plans {
            table.add_row(vec![
                Cell::new(i),
                Cell::new(model),
                Cell::new(kind),
                Cell::new(plan),
            ]);
        }

        table.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_summary(&self, summary: &[KindSummary]) -> String {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_rows(&self, rows: &[ReportRow]) -> String {
        serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_plans(&self, report: &Report) -> String {
        let plans: Vec<serde_json::Value> = report
            .results()
            .iter()
            .enumerate()
            .filter_map(|(i, result)| {
                result.plan().map(|plan| {
                    serde_json::json!({
                        "index": i,
                        "model_name": result.model_name(),
                        "operation_kind": result.kind(),
                        "plan": plan,
                    })
                })
            })
            .collect();
        serde_json::to_string_pretty(&plans).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({
            "error": error
        })
        .to_string()
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_summary(&self, summary: &[KindSummary]) -> String {
        let mut output = String::from(
            "model_name,operation_kind,executions,errors,mean_ms,p50_ms,p99_ms,min_ms,max_ms\n",
        );
        for entry in summary {
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&entry.model_name),
                entry.kind,
                entry.executions,
                entry.errors,
                millis(entry.mean),
                millis(entry.p50),
                millis(entry.p99),
                millis(entry.min),
                millis(entry.max),
            ));
        }
        output
    }

    fn format_rows(&self, rows: &[ReportRow]) -> String {
        let mut output = String::from("model_name,operation_kind,duration_ms,row_or_doc_count,error\n");
        for row in rows {
            output.push_str(&format!(
                "{},{},{},{},{}\n",
                escape_csv(&row.model_name),
                row.operation_kind,
                millis(row.duration),
                row.row_or_doc_count
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                row.error.as_deref().map(escape_csv).unwrap_or_default(),
            ));
        }
        output
    }

    fn format_plans(&self, report: &Report) -> String {
        let mut output = String::from("index,model_name,operation_kind,plan\n");
        for (i, model, kind, plan) in plans(report) {
            output.push_str(&format!("{},{},{},{}\n", i, escape_csv(model), kind, escape_csv(&plan)));
        }
        output
    }

    fn format_error(&self, error: &str) -> String {
        format!("error\n{}", escape_csv(error))
    }
}

/// Quote a CSV field when it contains separators, quotes or newlines.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudbench_core::OperationKind;
    use std::time::Duration;

    fn rows() -> Vec<ReportRow> {
        vec![
            ReportRow {
                model_name: "relational".into(),
                operation_kind: OperationKind::Create,
                duration: Duration::from_micros(1_500),
                row_or_doc_count: Some(1),
                error: None,
            },
            ReportRow {
                model_name: "doc_customer".into(),
                operation_kind: OperationKind::Create,
                duration: Duration::from_micros(20),
                row_or_doc_count: None,
                error: Some("unsupported: needs customer_id, got none".into()),
            },
        ]
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_rows() {
        let output = CsvFormatter.format_rows(&rows());
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "model_name,operation_kind,duration_ms,row_or_doc_count,error");
        assert_eq!(lines[1], "relational,create,1.500,1,");
        assert_eq!(
            lines[2],
            "doc_customer,create,0.020,,\"unsupported: needs customer_id, got none\""
        );
    }

    #[test]
    fn test_json_rows() {
        let output = JsonFormatter.format_rows(&rows());
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["model_name"], "relational");
        assert_eq!(parsed[0]["duration_ms"], 1.5);
        assert_eq!(parsed[1]["row_or_doc_count"], serde_json::Value::Null);
    }

    #[test]
    fn test_table_rows() {
        let output = TableFormatter.format_rows(&rows());
        assert!(output.contains("relational"));
        assert!(output.contains("1.500"));
        assert!(output.contains("doc_customer"));
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(TableFormatter.format_summary(&[]), "No results");
        assert_eq!(JsonFormatter.format_summary(&[]), "[]");
    }

    #[test]
    fn test_format_error() {
        assert_eq!(TableFormatter.format_error("boom"), "Error: boom");
        assert_eq!(JsonFormatter.format_error("boom"), r#"{"error":"boom"}"#);
    }
}
