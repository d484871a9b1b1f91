use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown replica id: {0}")]
    UnknownReplica(u64),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid QC: has {have} signatures, need {need}")]
    InvalidQc { have: usize, need: usize },

    #[error("Phase violation: {0}")]
    PhaseViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
