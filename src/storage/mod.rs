mod block_store;

pub use block_store::BlockStore;
