use serde::{Deserialize, Serialize};

use crate::types::{Hash, Phase};

/// A simulated threshold signature share from one replica, the tuple
/// tsign_r(<phase, view, block_hash>). Two shares with equal fields are
/// equal; no real cryptography is involved.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PartialSignature {
    pub replica_id: u64,
    pub phase: Phase,
    pub view: u64,
    pub block_hash: Hash,
}

impl PartialSignature {
    pub fn new(replica_id: u64, phase: Phase, view: u64, block_hash: Hash) -> Self {
        Self {
            replica_id,
            phase,
            view,
            block_hash,
        }
    }

    /// Field-equality verification, the simulation stand-in for tverify.
    pub fn matches(&self, phase: Phase, view: u64, block_hash: Hash) -> bool {
        self.phase == phase && self.view == view && self.block_hash == block_hash
    }
}
