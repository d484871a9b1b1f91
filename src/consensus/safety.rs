use std::collections::{HashMap, HashSet};

use log::debug;

use crate::types::{Block, Hash, QuorumCert};

/// Safety rules for Basic HotStuff.
///
/// Implements the safeNode(node, qc) predicate from Algorithm 1:
/// (node extends from lockedQC.node) OR (qc.viewNumber > lockedQC.viewNumber)
pub struct SafetyRules {
    registry: HashMap<Hash, Block>,
}

impl SafetyRules {
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut registry = HashMap::new();
        registry.insert(genesis.hash, genesis);
        Self { registry }
    }

    /// Register a block for ancestry checks.
    pub fn register_block(&mut self, block: &Block) {
        self.registry.insert(block.hash, block.clone());
    }

    /// Whether voting for `block` is safe given the proposal's justify QC
    /// and the replica's current lock.
    pub fn is_safe_node(
        &self,
        block: &Block,
        justify_qc: Option<&QuorumCert>,
        locked_qc: Option<&QuorumCert>,
    ) -> bool {
        let locked = match locked_qc {
            None => return true,
            Some(locked) => locked,
        };

        if self.extends_from(block, locked.block_hash) {
            return true;
        }

        if let Some(justify) = justify_qc {
            if justify.view > locked.view {
                debug!(
                    "safe by liveness rule: justify view {} > locked view {}",
                    justify.view, locked.view
                );
                return true;
            }
        }

        debug!(
            "unsafe: block {} neither extends lock {} nor carries a higher QC",
            block.hash.short(),
            locked.block_hash.short()
        );
        false
    }

    /// Whether `ancestor` appears on the parent chain of `block`. The
    /// visited set guards against hash cycles in adversarial input.
    pub fn extends_from(&self, block: &Block, ancestor: Hash) -> bool {
        let mut current = block.parent_hash;
        let mut visited: HashSet<Hash> = HashSet::new();

        while let Some(hash) = current {
            if !visited.insert(hash) {
                break;
            }
            if hash == ancestor {
                return true;
            }
            current = self.registry.get(&hash).and_then(|parent| parent.parent_hash);
        }

        block.parent_hash == Some(ancestor)
    }

    pub fn validate_qc(&self, qc: &QuorumCert, quorum: usize) -> bool {
        qc.is_valid(quorum)
    }
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartialSignature, Phase};

    fn qc_for(block: &Block, view: u64) -> QuorumCert {
        let signatures = (0..3)
            .map(|id| PartialSignature::new(id, Phase::PreCommit, view, block.hash))
            .collect();
        QuorumCert::new(Phase::PreCommit, view, block.hash, signatures)
    }

    fn chain(rules: &mut SafetyRules, len: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis()];
        for i in 1..=len {
            let child = Block::create_leaf(
                blocks.last().unwrap(),
                format!("cmd_{}_1", i),
                0,
                i as u64,
            );
            rules.register_block(&child);
            blocks.push(child);
        }
        blocks
    }

    #[test]
    fn test_no_lock_is_safe() {
        let rules = SafetyRules::new();
        let block = Block::create_leaf(&Block::genesis(), "cmd_1_1".to_string(), 0, 1);
        assert!(rules.is_safe_node(&block, None, None));
    }

    #[test]
    fn test_extending_lock_is_safe() {
        let mut rules = SafetyRules::new();
        let blocks = chain(&mut rules, 3);
        let locked = qc_for(&blocks[1], 1);
        // blocks[3] extends blocks[1] transitively
        assert!(rules.is_safe_node(&blocks[3], None, Some(&locked)));
    }

    #[test]
    fn test_fork_needs_higher_justify() {
        let mut rules = SafetyRules::new();
        let blocks = chain(&mut rules, 2);
        let locked = qc_for(&blocks[2], 2);

        // a fork off genesis does not extend the locked block
        let fork = Block::create_leaf(&blocks[0], "cmd_9_1".to_string(), 1, 9);
        rules.register_block(&fork);
        assert!(!rules.is_safe_node(&fork, None, Some(&locked)));

        // unless the justify QC is from a strictly higher view
        let low_justify = qc_for(&fork, 2);
        assert!(!rules.is_safe_node(&fork, Some(&low_justify), Some(&locked)));
        let high_justify = qc_for(&fork, 3);
        assert!(rules.is_safe_node(&fork, Some(&high_justify), Some(&locked)));
    }

    #[test]
    fn test_validate_qc_checks_quorum() {
        let rules = SafetyRules::new();
        let block = Block::create_leaf(&Block::genesis(), "cmd_1_1".to_string(), 0, 1);
        let qc = qc_for(&block, 1);
        assert!(rules.validate_qc(&qc, 3));
        assert!(!rules.validate_qc(&qc, 4));
    }

    #[test]
    fn test_extends_from_direct_parent_without_registry() {
        let rules = SafetyRules::new();
        let parent = Block::create_leaf(&Block::genesis(), "cmd_1_1".to_string(), 0, 1);
        let child = Block::create_leaf(&parent, "cmd_2_1".to_string(), 1, 2);
        // parent never registered, but the direct link still counts
        assert!(rules.extends_from(&child, parent.hash));
    }
}
