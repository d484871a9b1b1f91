use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Hash, PartialSignature, Phase};

/// A Quorum Certificate: proof that a quorum of replicas signed the same
/// (phase, view, block_hash) tuple.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct QuorumCert {
    pub phase: Phase,
    pub view: u64,
    pub block_hash: Hash,
    pub signatures: Vec<PartialSignature>,
}

impl QuorumCert {
    pub fn new(
        phase: Phase,
        view: u64,
        block_hash: Hash,
        signatures: Vec<PartialSignature>,
    ) -> Self {
        Self {
            phase,
            view,
            block_hash,
            signatures,
        }
    }

    /// A QC is valid when it carries at least `quorum` distinct signers and
    /// every share matches the QC's own key fields.
    pub fn is_valid(&self, quorum: usize) -> bool {
        if !self
            .signatures
            .iter()
            .all(|sig| sig.matches(self.phase, self.view, self.block_hash))
        {
            return false;
        }
        self.signer_count() >= quorum
    }

    /// Number of distinct signers.
    pub fn signer_count(&self) -> usize {
        self.signatures
            .iter()
            .map(|sig| sig.replica_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Distinct signer ids in ascending order.
    pub fn signer_ids(&self) -> Vec<u64> {
        self.signatures
            .iter()
            .map(|sig| sig.replica_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl std::fmt::Display for QuorumCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "QC {{ phase: {}, view: {}, block: {}, signers: {} }}",
            self.phase,
            self.view,
            self.block_hash.short(),
            self.signer_count()
        )
    }
}
