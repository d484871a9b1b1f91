use serde::{Deserialize, Serialize};
use std::fmt::{self, Formatter};

use crate::types::Hash;

/// An immutable block in the replicated log.
///
/// The hash is a deterministic digest over (parent_hash, command, height,
/// proposer, view) computed once at construction.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Block {
    pub parent_hash: Option<Hash>,
    pub command: String,
    pub height: u64,
    pub proposer: u64,
    pub view: u64,
    pub hash: Hash,
}

impl Block {
    /// The genesis block: no parent, height 0, proposed in view 0.
    pub fn genesis() -> Self {
        Self::build(None, "genesis".to_string(), 0, 0, 0)
    }

    /// createLeaf(parent, cmd): a new block extending `parent`.
    pub fn create_leaf(parent: &Block, command: String, proposer: u64, view: u64) -> Self {
        Self::build(Some(parent.hash), command, parent.height + 1, proposer, view)
    }

    fn build(
        parent_hash: Option<Hash>,
        command: String,
        height: u64,
        proposer: u64,
        view: u64,
    ) -> Self {
        let mut data = Vec::new();
        match parent_hash {
            Some(parent) => data.extend_from_slice(parent.as_bytes()),
            None => data.extend_from_slice(Hash::zero().as_bytes()),
        }
        data.extend_from_slice(command.as_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&proposer.to_be_bytes());
        data.extend_from_slice(&view.to_be_bytes());
        let hash = Hash::from_bytes(&data);

        Self {
            parent_hash,
            command,
            height,
            proposer,
            view,
            hash,
        }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {{ hash: {}, parent: {}, height: {}, proposer: {}, view: {} }}",
            self.hash.short(),
            self.parent_hash.map_or_else(|| "none".to_string(), |h| h.short()),
            self.height,
            self.proposer,
            self.view
        )
    }
}
