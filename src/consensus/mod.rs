mod leader;
mod pacemaker;
mod replica;
mod safety;
mod vote_collector;

pub use leader::LeaderScheduler;
pub use pacemaker::{AdaptivePacemaker, BaselinePacemaker, Pacemaker, PacemakerKind};
pub use replica::{Replica, ReplicaStateView};
pub use safety::SafetyRules;
pub use vote_collector::VoteCollector;
