use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::types::{Block, Hash, PartialSignature, Phase, QuorumCert};

/// Tag identifying the eight protocol message types, used for event
/// synthesis and receipt validation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    NewView,
    Prepare,
    PrepareVote,
    PreCommit,
    PreCommitVote,
    Commit,
    CommitVote,
    Decide,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::NewView => "NEW_VIEW",
            MessageKind::Prepare => "PREPARE",
            MessageKind::PrepareVote => "PREPARE_VOTE",
            MessageKind::PreCommit => "PRE_COMMIT",
            MessageKind::PreCommitVote => "PRE_COMMIT_VOTE",
            MessageKind::Commit => "COMMIT",
            MessageKind::CommitVote => "COMMIT_VOTE",
            MessageKind::Decide => "DECIDE",
        };
        write!(f, "{}", name)
    }
}

/// Payload of a protocol message, Msg(type, node, qc) from the paper as a
/// tagged union.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Payload {
    NewView {
        justify_qc: Option<QuorumCert>,
    },
    Prepare {
        block: Block,
        high_qc: Option<QuorumCert>,
    },
    PrepareVote {
        block_hash: Hash,
        signature: PartialSignature,
    },
    PreCommit {
        prepare_qc: QuorumCert,
    },
    PreCommitVote {
        block_hash: Hash,
        signature: PartialSignature,
    },
    Commit {
        precommit_qc: QuorumCert,
    },
    CommitVote {
        block_hash: Hash,
        signature: PartialSignature,
    },
    Decide {
        commit_qc: QuorumCert,
    },
}

/// A protocol message with its envelope. `target` of None means broadcast.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: u64,
    pub view: u64,
    pub timestamp: u64,
    pub target: Option<u64>,
    pub payload: Payload,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match &self.payload {
            Payload::NewView { .. } => MessageKind::NewView,
            Payload::Prepare { .. } => MessageKind::Prepare,
            Payload::PrepareVote { .. } => MessageKind::PrepareVote,
            Payload::PreCommit { .. } => MessageKind::PreCommit,
            Payload::PreCommitVote { .. } => MessageKind::PreCommitVote,
            Payload::Commit { .. } => MessageKind::Commit,
            Payload::CommitVote { .. } => MessageKind::CommitVote,
            Payload::Decide { .. } => MessageKind::Decide,
        }
    }

    /// Validate the message on receipt: vote signatures must belong to the
    /// sender, and a carried QC must match the quorum size and the phase
    /// the message type requires. Failures are dropped by the caller,
    /// never propagated.
    pub fn validate(&self, quorum: usize) -> Result<(), SimError> {
        if let Payload::PrepareVote {
            block_hash,
            signature,
        }
        | Payload::PreCommitVote {
            block_hash,
            signature,
        }
        | Payload::CommitVote {
            block_hash,
            signature,
        } = &self.payload
        {
            if signature.replica_id != self.sender {
                return Err(SimError::InvalidMessage(format!(
                    "vote signed by {} but sent by {}",
                    signature.replica_id, self.sender
                )));
            }
            if signature.block_hash != *block_hash {
                return Err(SimError::InvalidMessage(
                    "vote signature does not cover the voted block".to_string(),
                ));
            }
        }

        match &self.payload {
            Payload::PreCommit { prepare_qc } => {
                Self::check_qc(prepare_qc, Phase::Prepare, quorum)
            }
            Payload::Commit { precommit_qc } => {
                Self::check_qc(precommit_qc, Phase::PreCommit, quorum)
            }
            Payload::Decide { commit_qc } => Self::check_qc(commit_qc, Phase::Commit, quorum),
            Payload::NewView {
                justify_qc: Some(qc),
            }
            | Payload::Prepare {
                high_qc: Some(qc), ..
            } => {
                if !qc.is_valid(quorum) {
                    return Err(SimError::InvalidQc {
                        have: qc.signer_count(),
                        need: quorum,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_qc(qc: &QuorumCert, expected: Phase, quorum: usize) -> Result<(), SimError> {
        if qc.phase != expected {
            return Err(SimError::PhaseViolation(format!(
                "expected {} QC, got {}",
                expected, qc.phase
            )));
        }
        if !qc.is_valid(quorum) {
            return Err(SimError::InvalidQc {
                have: qc.signer_count(),
                need: quorum,
            });
        }
        Ok(())
    }
}
