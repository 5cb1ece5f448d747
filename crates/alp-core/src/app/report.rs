//! LogReport - イテレーションログの集計
//!
//! Only `IterationLogged` entries count; other events in the log are ignored.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{IterationLogEntry, IterationStatus};

/// LogReport はログ全体の要約
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogReport {
    pub total_iterations: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Share of entries with status Failed, 0.0 for an empty log.
    pub error_rate: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_performance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_performance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_performance: Option<f64>,
}

impl LogReport {
    /// Entries are taken in log order: the first and last timestamps bound the run.
    pub fn from_entries(entries: &[IterationLogEntry]) -> Self {
        let total = entries.len();
        let failed = entries
            .iter()
            .filter(|e| e.status == IterationStatus::Failed)
            .count();
        let error_rate = if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        };

        let scores: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.performance)
            .filter(|p| !p.is_nan())
            .collect();
        let (avg, max, min) = if scores.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = scores.iter().sum();
            (
                Some(sum / scores.len() as f64),
                scores.iter().copied().reduce(f64::max),
                scores.iter().copied().reduce(f64::min),
            )
        };

        Self {
            total_iterations: total,
            start_time: entries.first().map(|e| e.timestamp),
            end_time: entries.last().map(|e| e.timestamp),
            error_rate,
            avg_performance: avg,
            max_performance: max,
            min_performance: min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IterationId;
    use chrono::TimeZone;

    fn entry(n: u32, status: IterationStatus, performance: Option<f64>) -> IterationLogEntry {
        IterationLogEntry {
            iteration_number: n,
            iteration_id: IterationId::new(format!("iter-{n}")).unwrap(),
            status,
            performance,
            metrics: Default::default(),
            error_details: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, n, 0).unwrap(),
        }
    }

    #[test]
    fn empty_log_has_no_statistics() {
        let report = LogReport::from_entries(&[]);
        assert_eq!(report.total_iterations, 0);
        assert_eq!(report.error_rate, 0.0);
        assert_eq!(report.start_time, None);
        assert_eq!(report.avg_performance, None);
    }

    #[test]
    fn aggregates_performance_and_errors() {
        let entries = vec![
            entry(1, IterationStatus::Completed, Some(0.2)),
            entry(2, IterationStatus::Failed, None),
            entry(3, IterationStatus::Completed, Some(0.6)),
            entry(4, IterationStatus::Completed, Some(0.4)),
        ];
        let report = LogReport::from_entries(&entries);

        assert_eq!(report.total_iterations, 4);
        assert_eq!(report.error_rate, 0.25);
        assert_eq!(report.start_time, Some(entries[0].timestamp));
        assert_eq!(report.end_time, Some(entries[3].timestamp));
        assert!((report.avg_performance.unwrap() - 0.4).abs() < 1e-12);
        assert_eq!(report.max_performance, Some(0.6));
        assert_eq!(report.min_performance, Some(0.2));
    }

    #[test]
    fn missing_statistics_are_left_out_of_json() {
        let report = LogReport::from_entries(&[entry(1, IterationStatus::Failed, None)]);
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["error_rate"], 1.0);
        assert!(v.get("avg_performance").is_none());
    }
}
