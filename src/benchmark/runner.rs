use log::{error, info};

use crate::benchmark::{AggregatedResult, BenchmarkConfig, RunResult, SingleRunConfig};
use crate::metrics::MetricsCollector;
use crate::simulation::SimulationEngine;

/// Runs simulations headlessly across configurations and collects metrics.
pub struct BenchmarkRunner {
    verbose: bool,
}

impl BenchmarkRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run one simulation to its step budget and fold the history into a
    /// RunResult. A run that commits nothing is marked unsuccessful, not an
    /// error.
    pub fn run_single(
        &self,
        config: &SingleRunConfig,
        run_index: u64,
        seed: Option<u64>,
    ) -> RunResult {
        let settings = config.to_settings(seed);
        let mut metrics = MetricsCollector::new();
        metrics.set_start_time(0);

        let summary = match SimulationEngine::new(settings) {
            Ok(mut engine) => {
                engine.start();
                let max_steps = config.max_steps();
                let mut steps = 0;
                while steps < max_steps {
                    if engine.step().is_none() {
                        break;
                    }
                    steps += 1;
                }
                metrics.record_all(engine.event_history());
                metrics.summary()
            }
            Err(e) => {
                error!("simulation failed to start: {}", e);
                metrics.summary()
            }
        };

        RunResult {
            config: config.clone(),
            run_index,
            success: summary.total_blocks_committed > 0,
            blocks_committed: summary.total_blocks_committed,
            total_views: summary.total_views,
            total_timeouts: summary.total_timeouts,
            latency_avg_ms: summary.average_commit_latency_ms,
            latency_p50_ms: summary.p50_latency_ms,
            latency_p95_ms: summary.p95_latency_ms,
            latency_p99_ms: summary.p99_latency_ms,
            throughput: summary.throughput_blocks_per_second,
            duration_ms: summary.simulation_duration_ms,
        }
    }

    /// Run every configuration in the benchmark, `runs_per_config` times
    /// each, seeding run k with `random_seed_base + k`.
    pub fn run_batch(&self, benchmark: &BenchmarkConfig) -> Vec<RunResult> {
        let configs = benchmark.generate_run_configs();
        let total_runs = configs.len() as u64 * benchmark.runs_per_config;

        info!(
            "running benchmark '{}': {} configurations, {} runs each",
            benchmark.name,
            configs.len(),
            benchmark.runs_per_config
        );

        let mut results = Vec::new();
        let mut run_counter = 0u64;

        for config in &configs {
            for run_index in 0..benchmark.runs_per_config {
                let seed = benchmark
                    .random_seed_base
                    .map(|base| base + run_counter);
                let result = self.run_single(config, run_index, seed);

                run_counter += 1;
                if self.verbose {
                    info!(
                        "[{}/{}] n={} f={} ft={} -> {} blocks ({})",
                        run_counter,
                        total_runs,
                        config.num_replicas,
                        config.num_faulty,
                        config.fault_type,
                        result.blocks_committed,
                        if result.success { "ok" } else { "failed" }
                    );
                }
                results.push(result);
            }
        }
        results
    }

    /// Group results by configuration and aggregate each group.
    pub fn aggregate_results(&self, results: &[RunResult]) -> Vec<AggregatedResult> {
        let mut groups: Vec<(String, SingleRunConfig, Vec<RunResult>)> = Vec::new();
        for result in results {
            let key = serde_json::to_string(&result.config).expect("config serializes");
            match groups.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, _, group)) => group.push(result.clone()),
                None => groups.push((key, result.config.clone(), vec![result.clone()])),
            }
        }
        groups
            .into_iter()
            .map(|(_, config, group)| AggregatedResult::from_runs(config, &group))
            .collect()
    }
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(false)
    }
}
