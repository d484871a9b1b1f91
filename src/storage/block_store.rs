use std::collections::HashMap;

use crate::types::{Block, Hash};

/// Per-replica content-addressed block storage, seeded with genesis.
///
/// Each replica owns its own store; blocks learned from the network are
/// copied in, never shared across replicas.
pub struct BlockStore {
    blocks: HashMap<Hash, Block>,
    genesis_hash: Hash,
}

impl BlockStore {
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let genesis_hash = genesis.hash;
        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis);
        Self {
            blocks,
            genesis_hash,
        }
    }

    /// Insert a block. Two different blocks mapping to one hash would break
    /// content addressing, so that case is a programming fault.
    pub fn insert(&mut self, block: Block) {
        if let Some(existing) = self.blocks.get(&block.hash) {
            assert_eq!(
                existing, &block,
                "hash collision: two distinct blocks share {}",
                block.hash
            );
            return;
        }
        self.blocks.insert(block.hash, block);
    }

    pub fn get(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[&self.genesis_hash]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}
