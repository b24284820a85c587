use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::common::error::DiscoveryError;

/// Which facade operation a metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    FindCloudlet,
    VerifyLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetric {
    pub operation: Operation,
    pub started_at_ms: u64, // milliseconds since epoch
    pub latency_ms: u64,
    pub success: bool,
    pub failure_kind: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub failure_rate: f64,

    // Latency of successful calls (milliseconds)
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,

    pub operations: HashMap<Operation, OperationStats>,

    // Failures keyed by DiscoveryError::kind
    pub failure_kinds: HashMap<String, usize>,
}

/// Breakdown for one operation. Latencies cover successful calls only.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub calls: usize,
    pub failed_calls: usize,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
}

#[derive(Debug)]
pub struct CallMetrics {
    client_name: String,
    start_time: Instant,
    calls: Vec<CallMetric>,
}

impl CallMetrics {
    pub fn new(client_name: String) -> Self {
        Self {
            client_name,
            start_time: Instant::now(),
            calls: Vec::new(),
        }
    }

    pub fn record_call(
        &mut self,
        operation: Operation,
        latency: Duration,
        failure: Option<&DiscoveryError>,
    ) {
        let started_at_ms = std::time::SystemTime::now()
            .checked_sub(latency)
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        self.calls.push(CallMetric {
            operation,
            started_at_ms,
            latency_ms: latency.as_millis() as u64,
            success: failure.is_none(),
            failure_kind: failure.map(|e| e.kind().to_string()),
        });
    }

    pub fn calls(&self) -> &[CallMetric] {
        &self.calls
    }

    pub fn aggregate(&self) -> AggregatedStats {
        let mut stats = AggregatedStats::default();

        if self.calls.is_empty() {
            return stats;
        }

        stats.total_calls = self.calls.len();
        stats.successful_calls = self.calls.iter().filter(|c| c.success).count();
        stats.failed_calls = stats.total_calls - stats.successful_calls;
        stats.failure_rate = (stats.failed_calls as f64 / stats.total_calls as f64) * 100.0;

        let mut latencies: Vec<u64> = self
            .calls
            .iter()
            .filter(|c| c.success)
            .map(|c| c.latency_ms)
            .collect();

        latencies.sort_unstable();
        if let (Some(&min), Some(&max)) = (latencies.first(), latencies.last()) {
            stats.latency_min_ms = min;
            stats.latency_max_ms = max;
            stats.latency_avg_ms =
                latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;

            stats.latency_p50_ms = percentile(&latencies, 50.0);
            stats.latency_p95_ms = percentile(&latencies, 95.0);
            stats.latency_p99_ms = percentile(&latencies, 99.0);
        }

        let mut per_operation: HashMap<Operation, Vec<u64>> = HashMap::new();
        for call in &self.calls {
            let entry = stats.operations.entry(call.operation).or_default();
            entry.calls += 1;
            if call.success {
                per_operation
                    .entry(call.operation)
                    .or_default()
                    .push(call.latency_ms);
            } else {
                entry.failed_calls += 1;
            }
        }
        for (operation, mut latencies) in per_operation {
            latencies.sort_unstable();
            if let Some(entry) = stats.operations.get_mut(&operation) {
                entry.latency_p50_ms = percentile(&latencies, 50.0);
                entry.latency_p95_ms = percentile(&latencies, 95.0);
            }
        }

        for kind in self.calls.iter().filter_map(|c| c.failure_kind.as_ref()) {
            *stats.failure_kinds.entry(kind.clone()).or_insert(0) += 1;
        }

        stats
    }

    /// Write the aggregated stats to `path`, creating missing parent directories.
    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stats = self.aggregate();

        let output = serde_json::json!({
            "client_name": self.client_name,
            "run_duration_secs": self.start_time.elapsed().as_secs(),
            "aggregated_stats": stats,
        });

        let json_string = serde_json::to_string_pretty(&output)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;

        Ok(())
    }
}

/// Nearest-rank percentile over ascending `sorted` latencies.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_uses_nearest_rank() {
        let latencies: Vec<u64> = (1..=10).map(|n| n * 10).collect();
        assert_eq!(percentile(&latencies, 50.0), 50);
        assert_eq!(percentile(&latencies, 95.0), 100);
        assert_eq!(percentile(&latencies, 0.0), 10);
        assert_eq!(percentile(&[], 99.0), 0);
    }

    #[test]
    fn aggregation_splits_operations_and_failure_kinds() {
        let mut metrics = CallMetrics::new("TestClient".to_string());
        let timeout = DiscoveryError::DeadlineExceeded(Duration::from_secs(10));
        let refused = DiscoveryError::Transport("connection refused".to_string());

        for ms in [40, 60, 90] {
            metrics.record_call(Operation::FindCloudlet, Duration::from_millis(ms), None);
        }
        metrics.record_call(Operation::FindCloudlet, Duration::from_millis(3), Some(&refused));
        metrics.record_call(Operation::FindCloudlet, Duration::from_millis(5), Some(&refused));
        metrics.record_call(Operation::VerifyLocation, Duration::from_millis(20), None);
        metrics.record_call(Operation::VerifyLocation, Duration::from_secs(10), Some(&timeout));
        metrics.record_call(
            Operation::VerifyLocation,
            Duration::from_millis(15),
            Some(&DiscoveryError::NoCloudlet),
        );

        let stats = metrics.aggregate();

        assert_eq!(stats.total_calls, 8);
        assert_eq!(stats.successful_calls, 4);
        assert_eq!(stats.failed_calls, 4);
        assert_eq!(stats.failure_rate, 50.0);
        assert_eq!(stats.latency_min_ms, 20);
        assert_eq!(stats.latency_max_ms, 90);

        assert_eq!(
            stats.operations[&Operation::FindCloudlet],
            OperationStats {
                calls: 5,
                failed_calls: 2,
                latency_p50_ms: 60,
                latency_p95_ms: 90,
            }
        );
        assert_eq!(
            stats.operations[&Operation::VerifyLocation],
            OperationStats {
                calls: 3,
                failed_calls: 2,
                latency_p50_ms: 20,
                latency_p95_ms: 20,
            }
        );

        assert_eq!(stats.failure_kinds.len(), 3);
        assert_eq!(stats.failure_kinds.get("transport"), Some(&2));
        assert_eq!(stats.failure_kinds.get("deadline_exceeded"), Some(&1));
        assert_eq!(stats.failure_kinds.get("no_cloudlet"), Some(&1));
    }

    #[test]
    fn operation_without_successes_reports_zero_latency() {
        let mut metrics = CallMetrics::new("TestClient".to_string());
        let rejected = DiscoveryError::Rejected("unauthorized".to_string());
        metrics.record_call(Operation::VerifyLocation, Duration::from_millis(8), Some(&rejected));

        let stats = metrics.aggregate();
        assert_eq!(
            stats.operations[&Operation::VerifyLocation],
            OperationStats {
                calls: 1,
                failed_calls: 1,
                latency_p50_ms: 0,
                latency_p95_ms: 0,
            }
        );
        assert_eq!(stats.latency_p99_ms, 0);
    }

    #[test]
    fn export_creates_missing_directories() {
        let mut metrics = CallMetrics::new("TestClient".to_string());
        metrics.record_call(Operation::VerifyLocation, Duration::from_millis(12), None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("client.json");
        metrics.export_to_json(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["client_name"], "TestClient");
        assert_eq!(written["aggregated_stats"]["total_calls"], 1);
        assert_eq!(
            written["aggregated_stats"]["operations"]["VerifyLocation"]["calls"],
            1
        );
    }
}
