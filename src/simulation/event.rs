use serde::{Deserialize, Serialize};

use crate::message::MessageKind;
use crate::types::Hash;

/// A single observable protocol action, appended to the engine's history.
///
/// The serialized form carries a `type` discriminant plus the type-specific
/// fields, matching the exported event-stream contract.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationEvent {
    ViewChange {
        replica_id: u64,
        new_view: u64,
        timestamp: u64,
    },
    Proposal {
        replica_id: u64,
        block_hash: Hash,
        view: u64,
        timestamp: u64,
    },
    VoteSend {
        replica_id: u64,
        vote_type: MessageKind,
        block_hash: Hash,
        timestamp: u64,
    },
    QcFormation {
        replica_id: u64,
        qc_type: crate::types::Phase,
        view: u64,
        timestamp: u64,
    },
    LockUpdate {
        replica_id: u64,
        locked_view: u64,
        timestamp: u64,
    },
    Commit {
        replica_id: u64,
        block_hash: Hash,
        height: u64,
        timestamp: u64,
    },
    Timeout {
        replica_id: u64,
        view: u64,
        next_view: u64,
        timestamp: u64,
    },
    MessageReceive {
        recipient_id: u64,
        sender_id: u64,
        message_type: MessageKind,
        message_id: u64,
        timestamp: u64,
    },
    ByzantineAction {
        replica_id: u64,
        action: String,
        view: u64,
        timestamp: u64,
    },
}

impl SimulationEvent {
    pub fn timestamp(&self) -> u64 {
        match self {
            SimulationEvent::ViewChange { timestamp, .. }
            | SimulationEvent::Proposal { timestamp, .. }
            | SimulationEvent::VoteSend { timestamp, .. }
            | SimulationEvent::QcFormation { timestamp, .. }
            | SimulationEvent::LockUpdate { timestamp, .. }
            | SimulationEvent::Commit { timestamp, .. }
            | SimulationEvent::Timeout { timestamp, .. }
            | SimulationEvent::MessageReceive { timestamp, .. }
            | SimulationEvent::ByzantineAction { timestamp, .. } => *timestamp,
        }
    }

    /// The replica the event is about: the acting replica, or the recipient
    /// for message deliveries.
    pub fn principal_id(&self) -> u64 {
        match self {
            SimulationEvent::ViewChange { replica_id, .. }
            | SimulationEvent::Proposal { replica_id, .. }
            | SimulationEvent::VoteSend { replica_id, .. }
            | SimulationEvent::QcFormation { replica_id, .. }
            | SimulationEvent::LockUpdate { replica_id, .. }
            | SimulationEvent::Commit { replica_id, .. }
            | SimulationEvent::Timeout { replica_id, .. }
            | SimulationEvent::ByzantineAction { replica_id, .. } => *replica_id,
            SimulationEvent::MessageReceive { recipient_id, .. } => *recipient_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SimulationEvent::ViewChange { .. } => "VIEW_CHANGE",
            SimulationEvent::Proposal { .. } => "PROPOSAL",
            SimulationEvent::VoteSend { .. } => "VOTE_SEND",
            SimulationEvent::QcFormation { .. } => "QC_FORMATION",
            SimulationEvent::LockUpdate { .. } => "LOCK_UPDATE",
            SimulationEvent::Commit { .. } => "COMMIT",
            SimulationEvent::Timeout { .. } => "TIMEOUT",
            SimulationEvent::MessageReceive { .. } => "MESSAGE_RECEIVE",
            SimulationEvent::ByzantineAction { .. } => "BYZANTINE_ACTION",
        }
    }
}
