use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::consensus::PacemakerKind;
use crate::error::SimError;
use crate::types::FaultKind;

/// Configuration for one simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleRunConfig {
    pub num_replicas: u64,
    pub num_faulty: u64,
    pub pacemaker_type: PacemakerKind,
    pub fault_type: FaultKind,
    pub base_timeout_ms: u64,
    pub max_views: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

impl Default for SingleRunConfig {
    fn default() -> Self {
        Self {
            num_replicas: 4,
            num_faulty: 1,
            pacemaker_type: PacemakerKind::Baseline,
            fault_type: FaultKind::Crash,
            base_timeout_ms: 1000,
            max_views: 50,
            random_seed: None,
        }
    }
}

impl SingleRunConfig {
    pub fn to_settings(&self, seed: Option<u64>) -> Settings {
        Settings {
            num_replicas: self.num_replicas,
            num_faulty: self.num_faulty,
            pacemaker_type: self.pacemaker_type,
            fault_type: self.fault_type,
            base_timeout_ms: self.base_timeout_ms,
            max_views: self.max_views,
            random_seed: seed.or(self.random_seed),
            ..Settings::default()
        }
    }

    /// Step budget for a headless run, scaled with replica and fault count.
    pub fn max_steps(&self) -> u64 {
        let scale = 50 * (1 + self.num_faulty);
        self.max_views * self.num_replicas * scale
    }
}

/// A set of parameter variations; each field lists the values to sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationSet {
    pub num_replicas: Vec<u64>,
    pub num_faulty: Vec<u64>,
    pub pacemaker_type: Vec<PacemakerKind>,
    pub fault_type: Vec<FaultKind>,
    pub base_timeout_ms: Vec<u64>,
}

impl Default for ConfigurationSet {
    fn default() -> Self {
        Self {
            num_replicas: vec![4],
            num_faulty: vec![1],
            pacemaker_type: vec![PacemakerKind::Baseline],
            fault_type: vec![FaultKind::Crash],
            base_timeout_ms: vec![1000],
        }
    }
}

/// Top-level benchmark description: named sweep, repeated runs per
/// configuration, deterministic seeding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub name: String,
    pub max_views: u64,
    pub runs_per_config: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed_base: Option<u64>,
    pub configurations: Vec<ConfigurationSet>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            name: "Benchmark".to_string(),
            max_views: 50,
            runs_per_config: 5,
            random_seed_base: Some(42),
            configurations: vec![ConfigurationSet::default()],
        }
    }
}

impl BenchmarkConfig {
    /// Load a benchmark description from a TOML or JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, SimError> {
        let content = std::fs::read_to_string(path)?;
        if path.extension() == Some(std::ffi::OsStr::new("toml")) {
            toml::from_str(&content)
                .map_err(|e| SimError::Configuration(format!("failed to parse TOML: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| SimError::Configuration(format!("failed to parse JSON: {}", e)))
        }
    }

    /// The Cartesian product of every configuration set.
    pub fn generate_run_configs(&self) -> Vec<SingleRunConfig> {
        let mut configs = Vec::new();
        for set in &self.configurations {
            for &n in &set.num_replicas {
                for &f in &set.num_faulty {
                    for &pacemaker in &set.pacemaker_type {
                        for &fault in &set.fault_type {
                            for &timeout in &set.base_timeout_ms {
                                configs.push(SingleRunConfig {
                                    num_replicas: n,
                                    num_faulty: f,
                                    pacemaker_type: pacemaker,
                                    fault_type: fault,
                                    base_timeout_ms: timeout,
                                    max_views: self.max_views,
                                    random_seed: None,
                                });
                            }
                        }
                    }
                }
            }
        }
        configs
    }

    pub fn total_runs(&self) -> u64 {
        self.generate_run_configs().len() as u64 * self.runs_per_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian_product() {
        let config = BenchmarkConfig {
            configurations: vec![ConfigurationSet {
                num_replicas: vec![4, 7],
                num_faulty: vec![0, 1],
                pacemaker_type: vec![PacemakerKind::Baseline, PacemakerKind::Adaptive],
                fault_type: vec![FaultKind::Crash],
                base_timeout_ms: vec![500, 1000, 2000],
            }],
            runs_per_config: 3,
            ..BenchmarkConfig::default()
        };
        let configs = config.generate_run_configs();
        assert_eq!(configs.len(), 2 * 2 * 2 * 3);
        assert_eq!(config.total_runs(), 24 * 3);
    }

    #[test]
    fn test_load_from_file_json() {
        let path = std::env::temp_dir().join("hotstuff_sim_benchmark_test.json");
        std::fs::write(
            &path,
            r#"{"name": "sweep", "max_views": 10, "runs_per_config": 2,
                "configurations": [{"num_replicas": [4, 7], "fault_type": ["SILENT"]}]}"#,
        )
        .unwrap();

        let benchmark = BenchmarkConfig::load_from_file(&path).unwrap();
        assert_eq!(benchmark.name, "sweep");
        let configs = benchmark.generate_run_configs();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].fault_type, FaultKind::Silent);
        assert_eq!(configs[0].max_views, 10);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_run_config_to_settings() {
        let run = SingleRunConfig {
            num_replicas: 7,
            num_faulty: 2,
            ..SingleRunConfig::default()
        };
        let settings = run.to_settings(Some(99));
        assert_eq!(settings.num_replicas, 7);
        assert_eq!(settings.random_seed, Some(99));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_step_budget_scales() {
        let run = SingleRunConfig {
            num_replicas: 4,
            num_faulty: 1,
            max_views: 50,
            ..SingleRunConfig::default()
        };
        assert_eq!(run.max_steps(), 50 * 4 * 100);
    }
}
