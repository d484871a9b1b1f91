use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::simulation::SimulationEvent;
use crate::types::Hash;

/// Summary statistics folded from an event stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_blocks_committed: u64,
    pub total_views: u64,
    pub total_timeouts: u64,
    pub average_commit_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub throughput_blocks_per_second: f64,
    pub simulation_duration_ms: u64,
}

/// Folds the engine's event stream into commit counts, latency quantiles,
/// and throughput. Latency is measured from a block's PROPOSAL to the first
/// COMMIT of the same hash; repeat commits of a hash on other replicas do
/// not add samples.
#[derive(Default)]
pub struct MetricsCollector {
    proposal_times: HashMap<Hash, u64>,
    committed_hashes: HashSet<Hash>,
    latencies_ms: Vec<f64>,
    view_changes: u64,
    timeouts: u64,
    start_time: u64,
    max_timestamp: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_start_time(&mut self, time: u64) {
        self.start_time = time;
    }

    pub fn record_event(&mut self, event: &SimulationEvent) {
        self.max_timestamp = self.max_timestamp.max(event.timestamp());

        match event {
            SimulationEvent::Proposal {
                block_hash,
                timestamp,
                ..
            } => {
                self.proposal_times.entry(*block_hash).or_insert(*timestamp);
            }
            SimulationEvent::Commit {
                block_hash,
                timestamp,
                ..
            } => {
                if self.committed_hashes.insert(*block_hash) {
                    if let Some(proposed) = self.proposal_times.get(block_hash) {
                        self.latencies_ms
                            .push(timestamp.saturating_sub(*proposed) as f64);
                    }
                }
            }
            SimulationEvent::ViewChange { .. } => self.view_changes += 1,
            SimulationEvent::Timeout { .. } => self.timeouts += 1,
            _ => {}
        }
    }

    pub fn record_all(&mut self, events: &[SimulationEvent]) {
        for event in events {
            self.record_event(event);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let mut sorted = self.latencies_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("latencies are finite"));

        let average = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        let duration_ms = self.max_timestamp.saturating_sub(self.start_time);
        let commits = self.committed_hashes.len() as u64;
        let throughput = if duration_ms > 0 {
            commits as f64 / (duration_ms as f64 / 1000.0)
        } else {
            0.0
        };

        MetricsSummary {
            total_blocks_committed: commits,
            total_views: self.view_changes,
            total_timeouts: self.timeouts,
            average_commit_latency_ms: average,
            p50_latency_ms: percentile(&sorted, 50.0),
            p95_latency_ms: percentile(&sorted, 95.0),
            p99_latency_ms: percentile(&sorted, 99.0),
            throughput_blocks_per_second: throughput,
            simulation_duration_ms: duration_ms,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Linear-interpolation percentile over an already sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return sorted[low];
    }
    let weight = rank - low as f64;
    sorted[low] * (1.0 - weight) + sorted[high] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(hash: Hash, timestamp: u64) -> SimulationEvent {
        SimulationEvent::Proposal {
            replica_id: 0,
            block_hash: hash,
            view: 1,
            timestamp,
        }
    }

    fn commit(replica_id: u64, hash: Hash, timestamp: u64) -> SimulationEvent {
        SimulationEvent::Commit {
            replica_id,
            block_hash: hash,
            height: 1,
            timestamp,
        }
    }

    #[test]
    fn test_latency_from_proposal_to_first_commit() {
        let mut metrics = MetricsCollector::new();
        let hash = Hash::from_bytes(b"b1");
        metrics.record_event(&proposal(hash, 100));
        metrics.record_event(&commit(0, hash, 350));
        // the same block committing on another replica adds no sample
        metrics.record_event(&commit(1, hash, 400));

        let summary = metrics.summary();
        assert_eq!(summary.total_blocks_committed, 1);
        assert_eq!(summary.average_commit_latency_ms, 250.0);
    }

    #[test]
    fn test_counters() {
        let mut metrics = MetricsCollector::new();
        metrics.record_event(&SimulationEvent::ViewChange {
            replica_id: 0,
            new_view: 2,
            timestamp: 10,
        });
        metrics.record_event(&SimulationEvent::Timeout {
            replica_id: 1,
            view: 1,
            next_view: 2,
            timestamp: 1000,
        });

        let summary = metrics.summary();
        assert_eq!(summary.total_views, 1);
        assert_eq!(summary.total_timeouts, 1);
        assert_eq!(summary.simulation_duration_ms, 1000);
    }

    #[test]
    fn test_throughput() {
        let mut metrics = MetricsCollector::new();
        for i in 0..4u8 {
            let hash = Hash::from_bytes(&[i]);
            metrics.record_event(&proposal(hash, 0));
            metrics.record_event(&commit(0, hash, 2000));
        }
        let summary = metrics.summary();
        // 4 blocks over 2 simulated seconds
        assert!((summary.throughput_blocks_per_second - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 50.0), 30.0);
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 100.0), 50.0);
        // p25 sits halfway between the first two samples
        assert_eq!(percentile(&sorted, 25.0), 20.0);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut metrics = MetricsCollector::new();
        let hash = Hash::from_bytes(b"b1");
        metrics.record_event(&proposal(hash, 0));
        metrics.record_event(&commit(0, hash, 10));
        metrics.reset();
        assert_eq!(metrics.summary().total_blocks_committed, 0);
    }
}
