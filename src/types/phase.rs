use serde::{Deserialize, Serialize};

/// Phase of a Basic HotStuff consensus round.
///
/// A view progresses NewView -> Prepare -> PreCommit -> Commit -> Decide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    NewView,
    Prepare,
    PreCommit,
    Commit,
    Decide,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::NewView => "NEW_VIEW",
            Phase::Prepare => "PREPARE",
            Phase::PreCommit => "PRE_COMMIT",
            Phase::Commit => "COMMIT",
            Phase::Decide => "DECIDE",
        };
        write!(f, "{}", name)
    }
}
