use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consensus::PacemakerKind;
use crate::error::SimError;
use crate::types::FaultKind;

pub const DEFAULT_NUM_REPLICAS: u64 = 4;
pub const DEFAULT_NUM_FAULTY: u64 = 1;
pub const DEFAULT_BASE_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_NETWORK_DELAY_MIN_MS: u64 = 10;
pub const DEFAULT_NETWORK_DELAY_MAX_MS: u64 = 100;
pub const DEFAULT_SIMULATION_SPEED: f64 = 1.0;
pub const DEFAULT_MAX_VIEWS: u64 = 100;
pub const DEFAULT_ADAPTIVE_ALPHA: f64 = 0.5;
pub const DEFAULT_ADAPTIVE_MIN_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_ADAPTIVE_MAX_TIMEOUT_MS: u64 = 5000;

pub const MIN_REPLICAS: u64 = 4;
pub const MAX_REPLICAS: u64 = 100;
pub const MAX_SIMULATION_SPEED: f64 = 100.0;

/// Simulation configuration. Validated at engine construction; an invalid
/// configuration never reaches a running simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Total replicas (n). Must satisfy n = 3f + 1.
    pub num_replicas: u64,
    /// Replicas marked faulty at startup (ids [n - f, n)).
    pub num_faulty: u64,
    pub base_timeout_ms: u64,
    pub network_delay_min_ms: u64,
    pub network_delay_max_ms: u64,
    /// Seed for all simulation randomness. None draws from the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
    pub pacemaker_type: PacemakerKind,
    pub fault_type: FaultKind,
    /// Playback speed multiplier for interactive hosts; the engine itself
    /// only checks the bounds.
    pub simulation_speed: f64,
    pub max_views: u64,
    pub adaptive_alpha: f64,
    pub adaptive_min_timeout_ms: u64,
    pub adaptive_max_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_replicas: DEFAULT_NUM_REPLICAS,
            num_faulty: DEFAULT_NUM_FAULTY,
            base_timeout_ms: DEFAULT_BASE_TIMEOUT_MS,
            network_delay_min_ms: DEFAULT_NETWORK_DELAY_MIN_MS,
            network_delay_max_ms: DEFAULT_NETWORK_DELAY_MAX_MS,
            random_seed: None,
            pacemaker_type: PacemakerKind::Baseline,
            fault_type: FaultKind::Crash,
            simulation_speed: DEFAULT_SIMULATION_SPEED,
            max_views: DEFAULT_MAX_VIEWS,
            adaptive_alpha: DEFAULT_ADAPTIVE_ALPHA,
            adaptive_min_timeout_ms: DEFAULT_ADAPTIVE_MIN_TIMEOUT_MS,
            adaptive_max_timeout_ms: DEFAULT_ADAPTIVE_MAX_TIMEOUT_MS,
        }
    }
}

impl Settings {
    /// Load settings from a TOML or JSON file, chosen by extension.
    pub fn load_from_file(path: &Path) -> Result<Self, SimError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = if path.extension() == Some(std::ffi::OsStr::new("toml")) {
            toml::from_str(&content)
                .map_err(|e| SimError::Configuration(format!("failed to parse TOML: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| SimError::Configuration(format!("failed to parse JSON: {}", e)))?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.num_replicas < MIN_REPLICAS || self.num_replicas > MAX_REPLICAS {
            return Err(SimError::Configuration(format!(
                "num_replicas must be in [{}, {}], got {}",
                MIN_REPLICAS, MAX_REPLICAS, self.num_replicas
            )));
        }
        if (self.num_replicas - 1) % 3 != 0 {
            return Err(SimError::Configuration(format!(
                "num_replicas must be 3f+1 for some integer f, got {}",
                self.num_replicas
            )));
        }
        if self.num_faulty > self.max_faulty() {
            return Err(SimError::Configuration(format!(
                "num_faulty {} exceeds the tolerable maximum {} for n={}",
                self.num_faulty,
                self.max_faulty(),
                self.num_replicas
            )));
        }
        if self.base_timeout_ms == 0 {
            return Err(SimError::Configuration(
                "base_timeout_ms must be positive".to_string(),
            ));
        }
        if self.network_delay_max_ms == 0 || self.network_delay_min_ms >= self.network_delay_max_ms
        {
            return Err(SimError::Configuration(format!(
                "network delay range [{}, {}] is invalid",
                self.network_delay_min_ms, self.network_delay_max_ms
            )));
        }
        if self.adaptive_alpha <= 0.0 || self.adaptive_alpha >= 1.0 {
            return Err(SimError::Configuration(format!(
                "adaptive_alpha must be in (0, 1), got {}",
                self.adaptive_alpha
            )));
        }
        if self.adaptive_min_timeout_ms > self.adaptive_max_timeout_ms {
            return Err(SimError::Configuration(format!(
                "adaptive timeout range [{}, {}] is invalid",
                self.adaptive_min_timeout_ms, self.adaptive_max_timeout_ms
            )));
        }
        if self.simulation_speed <= 0.0 || self.simulation_speed > MAX_SIMULATION_SPEED {
            return Err(SimError::Configuration(format!(
                "simulation_speed must be in (0, {}], got {}",
                MAX_SIMULATION_SPEED, self.simulation_speed
            )));
        }
        Ok(())
    }

    /// Quorum size: n - f (equals 2f + 1 when n = 3f + 1).
    pub fn quorum_size(&self) -> usize {
        (self.num_replicas - self.num_faulty) as usize
    }

    /// Maximum tolerable faulty replicas for this n.
    pub fn max_faulty(&self) -> u64 {
        (self.num_replicas - 1) / 3
    }
}
