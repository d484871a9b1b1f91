use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use crate::types::{Hash, PartialSignature, Phase, QuorumCert};

type VoteKey = (u64, Hash, Phase);

/// Collects partial signatures per (view, block_hash, phase) and forms a QC
/// exactly once when the quorum is first reached. Later votes for the same
/// key are silently ignored.
pub struct VoteCollector {
    quorum: usize,
    votes: HashMap<VoteKey, BTreeMap<u64, PartialSignature>>,
    emitted: HashSet<VoteKey>,
}

impl VoteCollector {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            votes: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    /// Add a vote; returns the newly formed QC when this vote completes the
    /// quorum, None otherwise (duplicate signer, already emitted, or short).
    pub fn add_vote(&mut self, signature: PartialSignature) -> Option<QuorumCert> {
        let key = (signature.view, signature.block_hash, signature.phase);

        if self.emitted.contains(&key) {
            debug!(
                "QC already emitted for view {} block {} phase {}",
                signature.view,
                signature.block_hash.short(),
                signature.phase
            );
            return None;
        }

        let entry = self.votes.entry(key).or_default();
        if entry.contains_key(&signature.replica_id) {
            debug!(
                "Duplicate vote from replica {} for view {} phase {}",
                signature.replica_id, signature.view, signature.phase
            );
            return None;
        }
        entry.insert(signature.replica_id, signature);

        if entry.len() >= self.quorum {
            let signatures: Vec<PartialSignature> = entry.values().copied().collect();
            self.emitted.insert(key);
            debug!(
                "QC formed for view {} block {} phase {} with {} signers",
                signature.view,
                signature.block_hash.short(),
                signature.phase,
                signatures.len()
            );
            return Some(QuorumCert::new(
                signature.phase,
                signature.view,
                signature.block_hash,
                signatures,
            ));
        }

        None
    }

    pub fn vote_count(&self, view: u64, block_hash: Hash, phase: Phase) -> usize {
        self.votes
            .get(&(view, block_hash, phase))
            .map_or(0, BTreeMap::len)
    }

    pub fn has_emitted(&self, view: u64, block_hash: Hash, phase: Phase) -> bool {
        self.emitted.contains(&(view, block_hash, phase))
    }

    /// Drop all state for a view, used at view change.
    pub fn clear_view(&mut self, view: u64) {
        self.votes.retain(|key, _| key.0 != view);
        self.emitted.retain(|key| key.0 != view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(replica_id: u64, view: u64, hash: Hash) -> PartialSignature {
        PartialSignature::new(replica_id, Phase::Prepare, view, hash)
    }

    #[test]
    fn test_qc_formed_at_quorum() {
        let mut collector = VoteCollector::new(3);
        let hash = Hash::from_bytes(b"b1");

        assert!(collector.add_vote(vote(0, 1, hash)).is_none());
        assert!(collector.add_vote(vote(1, 1, hash)).is_none());
        let qc = collector.add_vote(vote(2, 1, hash)).expect("quorum reached");
        assert_eq!(qc.signer_count(), 3);
        assert_eq!(qc.view, 1);
        assert!(qc.is_valid(3));
    }

    #[test]
    fn test_duplicate_signer_ignored() {
        let mut collector = VoteCollector::new(3);
        let hash = Hash::from_bytes(b"b1");

        assert!(collector.add_vote(vote(0, 1, hash)).is_none());
        assert!(collector.add_vote(vote(0, 1, hash)).is_none());
        assert_eq!(collector.vote_count(1, hash, Phase::Prepare), 1);
    }

    #[test]
    fn test_qc_emitted_once() {
        let mut collector = VoteCollector::new(2);
        let hash = Hash::from_bytes(b"b1");

        assert!(collector.add_vote(vote(0, 1, hash)).is_none());
        assert!(collector.add_vote(vote(1, 1, hash)).is_some());
        assert!(collector.has_emitted(1, hash, Phase::Prepare));
        // extra votes after QC formation are silently ignored
        assert!(collector.add_vote(vote(2, 1, hash)).is_none());
        assert!(collector.add_vote(vote(3, 1, hash)).is_none());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut collector = VoteCollector::new(2);
        let a = Hash::from_bytes(b"a");
        let b = Hash::from_bytes(b"b");

        assert!(collector.add_vote(vote(0, 1, a)).is_none());
        assert!(collector.add_vote(vote(1, 1, b)).is_none());
        assert_eq!(collector.vote_count(1, a, Phase::Prepare), 1);
        assert_eq!(collector.vote_count(1, b, Phase::Prepare), 1);
    }

    #[test]
    fn test_clear_view() {
        let mut collector = VoteCollector::new(3);
        let hash = Hash::from_bytes(b"b1");

        collector.add_vote(vote(0, 1, hash));
        collector.add_vote(vote(0, 2, hash));
        collector.clear_view(1);
        assert_eq!(collector.vote_count(1, hash, Phase::Prepare), 0);
        assert_eq!(collector.vote_count(2, hash, Phase::Prepare), 1);
    }
}
