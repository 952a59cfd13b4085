use crate::core::transaction::Transaction;
use crate::core::types::Hash;
use std::collections::HashMap;

/// ( K -> tx hash, V -> Transaction )
///
/// In-memory set of validated transactions awaiting inclusion. Lives inside
/// the chain engine's exclusive lock, so no interior locking here. Admission
/// order is preserved so block production drains the pool deterministically.
/// Entries vanish on inclusion or on node shutdown; the pool is never
/// persisted.
#[derive(Debug, Default)]
pub struct MemoryPool {
    entries: HashMap<Hash, Transaction>,
    order: Vec<Hash>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn add(&mut self, tx: Transaction) {
        let hash = tx.hash;
        if self.entries.insert(hash, tx).is_none() {
            self.order.push(hash);
        }
    }

    pub fn remove(&mut self, hash: &Hash) {
        if self.entries.remove(hash).is_some() {
            self.order.retain(|h| h != hash);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot up to `limit` pending transactions in admission order
    pub fn pending(&self, limit: usize) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|h| self.entries.get(h))
            .take(limit)
            .cloned()
            .collect()
    }
}
