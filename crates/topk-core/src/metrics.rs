use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::ServiceStats;

/// Statistics of one finished execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Wall-clock time from the first request to final extraction, in milliseconds.
    pub execution_time: f64,
    /// Bytes sent and received over all rounds.
    pub data_transfer: u64,
    pub http_calls: u64,
    pub solutions: usize,
    pub resuming_time: f64,
    pub saving_time: f64,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    current: MetricsSnapshot,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed round-trip.
    pub fn record_round(&mut self, request_bytes: usize, response_bytes: usize, stats: ServiceStats) {
        let bytes = u64::try_from(request_bytes.saturating_add(response_bytes)).unwrap_or(u64::MAX);
        self.current.data_transfer = self.current.data_transfer.saturating_add(bytes);
        self.current.http_calls += 1;
        self.current.resuming_time += stats.resuming_time;
        self.current.saving_time += stats.saving_time;
    }

    pub fn record_execution_time(&mut self, elapsed: Duration) {
        self.current.execution_time = elapsed.as_secs_f64() * 1000.0;
    }

    pub fn record_solutions(&mut self, count: usize) {
        self.current.solutions = count;
    }

    #[must_use]
    pub fn snapshot(self) -> MetricsSnapshot {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_accumulate_transfer_calls_and_service_times() {
        let mut collector = MetricsCollector::new();
        collector.record_round(100, 250, ServiceStats { resuming_time: 1.5, saving_time: 0.5 });
        collector.record_round(120, 30, ServiceStats::default());
        collector.record_round(80, 20, ServiceStats { resuming_time: 2.0, saving_time: 1.0 });
        collector.record_solutions(7);
        collector.record_execution_time(Duration::from_millis(1500));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.data_transfer, 600);
        assert_eq!(snapshot.http_calls, 3);
        assert_eq!(snapshot.solutions, 7);
        assert!((snapshot.resuming_time - 3.5).abs() < f64::EPSILON);
        assert!((snapshot.saving_time - 1.5).abs() < f64::EPSILON);
        assert!((snapshot.execution_time - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn snapshot_serializes_with_metric_names() {
        let snapshot = MetricsCollector::new().snapshot();
        let value = serde_json::to_value(snapshot).unwrap_or_else(|err| panic!("serialize: {err}"));
        for field in ["execution_time", "data_transfer", "http_calls", "solutions", "resuming_time", "saving_time"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }
}
