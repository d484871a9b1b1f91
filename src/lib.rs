pub mod benchmark;
pub mod config;
pub mod consensus;
pub mod error;
pub mod message;
pub mod metrics;
pub mod network;
pub mod simulation;
pub mod storage;
pub mod types;

pub use config::Settings;
pub use error::SimError;
pub use simulation::{SimulationEngine, SimulationEvent};
pub use types::{Block, FaultKind, Hash, PartialSignature, Phase, QuorumCert};
