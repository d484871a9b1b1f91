use serde::{Deserialize, Serialize};

/// Fault injected into a replica.
///
/// Crash stops the replica completely (the network also drops inbound
/// messages for it). Silent keeps receiving but never votes or proposes.
/// RandomDrop discards roughly half of its own actions. DoubleVote sends
/// conflicting prepare votes in the same view.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    #[default]
    None,
    Crash,
    Silent,
    RandomDrop,
    DoubleVote,
}

impl FaultKind {
    pub fn is_faulty(&self) -> bool {
        !matches!(self, FaultKind::None)
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FaultKind::None => "NONE",
            FaultKind::Crash => "CRASH",
            FaultKind::Silent => "SILENT",
            FaultKind::RandomDrop => "RANDOM_DROP",
            FaultKind::DoubleVote => "DOUBLE_VOTE",
        };
        write!(f, "{}", name)
    }
}
