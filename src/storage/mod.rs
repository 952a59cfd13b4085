//! Persistence and pending-transaction storage
//!
//! The chain store owns the on-disk state files; the memory pool holds
//! validated transactions awaiting inclusion.

pub mod chain_store;
pub mod memory_pool;

pub use chain_store::ChainStore;
pub use memory_pool::MemoryPool;
