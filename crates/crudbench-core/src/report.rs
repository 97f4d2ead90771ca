//! Benchmark reports.
//!
//! A [`Report`] keeps every [`ExecutionResult`] in execution order and an
//! index by `(model_name, kind)` for aggregation. Only the driver appends
//! to it; once handed to the caller it is read-only.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::histogram::Histogram;
use crate::operation::OperationKind;
use crate::result::ExecutionResult;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every (operation, model) pair was executed.
    Completed,
    /// Stopped at the first adapter error (`continue_on_error = false`).
    Failed,
    /// Stopped early on caller request.
    Cancelled,
}

/// Ordered results of one benchmark run.
#[derive(Debug, Clone)]
pub struct Report {
    results: Vec<ExecutionResult>,
    index: BTreeMap<(String, OperationKind), Vec<usize>>,
    status: RunStatus,
    started_at: DateTime<Utc>,
    elapsed: Duration,
}

impl Report {
    pub(crate) fn begin() -> Self {
        Self {
            results: Vec::new(),
            index: BTreeMap::new(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn push(&mut self, result: ExecutionResult) {
        let key = (result.model_name().to_string(), result.kind());
        self.index.entry(key).or_default().push(self.results.len());
        self.results.push(result);
    }

    pub(crate) fn finish(mut self, status: RunStatus, elapsed: Duration) -> Self {
        self.status = status;
        self.elapsed = elapsed;
        self
    }

    /// All results in execution order.
    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wall time of the whole run, including adapter open/close.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of results carrying an error.
    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Results of one model for one operation kind, in execution order.
    pub fn entries_for<'a>(
        &'a self,
        model_name: &str,
        kind: OperationKind,
    ) -> impl Iterator<Item = &'a ExecutionResult> + 'a {
        self.index
            .get(&(model_name.to_string(), kind))
            .into_iter()
            .flatten()
            .map(move |&i| &self.results[i])
    }

    /// Model names in the order they first appear.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = Vec::new();
        for result in &self.results {
            if !models.contains(&result.model_name()) {
                models.push(result.model_name());
            }
        }
        models
    }

    /// Aggregated timings per model and operation kind.
    ///
    /// Latency figures cover successful executions only; failures are
    /// counted in `errors`.
    pub fn summary(&self) -> Vec<KindSummary> {
        let mut out = Vec::new();
        for model in self.models() {
            for kind in OperationKind::ALL {
                let entries: Vec<&ExecutionResult> = self.entries_for(model, kind).collect();
                if entries.is_empty() {
                    continue;
                }
                out.push(KindSummary::from_entries(model, kind, &entries));
            }
        }
        out
    }

    /// Tabular export: one row per result, in execution order.
    pub fn rows(&self) -> Vec<ReportRow> {
        self.results.iter().map(ReportRow::from).collect()
    }
}

/// Aggregate for one `(model_name, kind)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindSummary {
    pub model_name: String,
    pub kind: OperationKind,
    pub executions: usize,
    pub errors: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub total: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub mean: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub min: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub max: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub p50: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub p99: Duration,
}

impl KindSummary {
    fn from_entries(model_name: &str, kind: OperationKind, entries: &[&ExecutionResult]) -> Self {
        let mut histogram = Histogram::latency();
        let mut total = Duration::ZERO;
        let mut min: Option<Duration> = None;
        let mut max = Duration::ZERO;
        let mut errors = 0;

        for entry in entries {
            if !entry.is_success() {
                errors += 1;
                continue;
            }
            let duration = entry.duration();
            histogram.observe(duration);
            total += duration;
            min = Some(min.map_or(duration, |m| m.min(duration)));
            max = max.max(duration);
        }

        let mean = mean_of(total, (entries.len() - errors) as u64);

        Self {
            model_name: model_name.to_string(),
            kind,
            executions: entries.len(),
            errors,
            total,
            mean,
            min: min.unwrap_or_default(),
            max,
            p50: histogram.p50(),
            p99: histogram.p99(),
        }
    }
}

/// One exported report row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub model_name: String,
    pub operation_kind: OperationKind,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub row_or_doc_count: Option<u64>,
    pub error: Option<String>,
}

impl From<&ExecutionResult> for ReportRow {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            model_name: result.model_name().to_string(),
            operation_kind: result.kind(),
            duration: result.duration(),
            row_or_doc_count: result.count(),
            error: result.error().map(|err| err.to_string()),
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// `total / samples`, exact for any sample count.
fn mean_of(total: Duration, samples: u64) -> Duration {
    if samples == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(samples);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterError, Outcome};

    fn ok(kind: OperationKind, model: &str, micros: u64, count: u64) -> ExecutionResult {
        ExecutionResult::new(
            kind,
            model,
            Duration::from_micros(micros),
            Ok(Outcome::new(count)),
        )
    }

    fn sample_report() -> Report {
        let mut report = Report::begin();
        report.push(ok(OperationKind::Create, "relational", 100, 1));
        report.push(ok(OperationKind::Create, "doc_txn", 60, 1));
        report.push(ok(OperationKind::Read, "relational", 30, 1));
        report.push(ExecutionResult::new(
            OperationKind::Read,
            "doc_txn",
            Duration::from_micros(5),
            Err::<Outcome, _>(AdapterError::Engine("corrupt page".into())),
        ));
        report.push(ok(OperationKind::Read, "relational", 50, 1));
        report.finish(RunStatus::Completed, Duration::from_millis(1))
    }

    #[test]
    fn test_entries_for_keeps_order() {
        let report = sample_report();
        let reads: Vec<_> = report
            .entries_for("relational", OperationKind::Read)
            .map(|r| r.duration())
            .collect();
        assert_eq!(
            reads,
            vec![Duration::from_micros(30), Duration::from_micros(50)]
        );
        assert_eq!(report.entries_for("doc_customer", OperationKind::Read).count(), 0);
    }

    #[test]
    fn test_models_in_first_seen_order() {
        let report = sample_report();
        assert_eq!(report.models(), vec!["relational", "doc_txn"]);
    }

    #[test]
    fn test_summary() {
        let report = sample_report();
        let summary = report.summary();
        assert_eq!(summary.len(), 4);

        let relational_reads = summary
            .iter()
            .find(|s| s.model_name == "relational" && s.kind == OperationKind::Read)
            .unwrap();
        assert_eq!(relational_reads.executions, 2);
        assert_eq!(relational_reads.errors, 0);
        assert_eq!(relational_reads.total, Duration::from_micros(80));
        assert_eq!(relational_reads.mean, Duration::from_micros(40));
        assert_eq!(relational_reads.min, Duration::from_micros(30));
        assert_eq!(relational_reads.max, Duration::from_micros(50));

        let failed_reads = summary
            .iter()
            .find(|s| s.model_name == "doc_txn" && s.kind == OperationKind::Read)
            .unwrap();
        assert_eq!(failed_reads.errors, 1);
        assert_eq!(failed_reads.mean, Duration::ZERO);
    }

    #[test]
    fn test_rows_export() {
        let report = sample_report();
        let rows = report.rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3].row_or_doc_count, None);
        assert_eq!(rows[3].error.as_deref(), Some("engine error: corrupt page"));

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["model_name"], "relational");
        assert_eq!(json["operation_kind"], "create");
        assert_eq!(json["duration_ms"], 0.1);
        assert_eq!(json["row_or_doc_count"], 1);
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_mean_beyond_u32_samples() {
        let samples = u64::from(u32::MAX) + 2;
        assert_eq!(mean_of(Duration::from_secs(samples), samples), Duration::from_secs(1));
        assert_eq!(mean_of(Duration::from_micros(80), 2), Duration::from_micros(40));
        assert_eq!(mean_of(Duration::from_secs(1), 0), Duration::ZERO);
    }

    #[test]
    fn test_error_count() {
        assert_eq!(sample_report().error_count(), 1);
    }
}
