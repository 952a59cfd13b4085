// The chain engine is the sole owner of chain state: blocks, accounts and
// the mempool all live behind one lock. Mutating operations take it
// exclusively, readers take it shared. Disk writes happen while the lock is
// held, and a block only becomes visible in memory after its state landed
// on disk, so an I/O failure can never leave a half-applied block behind.

use crate::config::ChainConfig;
use crate::core::transaction::{Transaction, TxType};
use crate::core::types::{Account, Address, Hash};
use crate::core::Block;
use crate::error::{ChainError, Result};
use crate::storage::{ChainStore, MemoryPool};
use crate::utils::current_timestamp;
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

struct ChainInner {
    blocks: Vec<Block>,
    accounts: HashMap<Address, Account>,
    mempool: MemoryPool,
    height: i64,
    last_hash: Hash,
}

#[derive(Clone)]
pub struct Chain {
    inner: Arc<RwLock<ChainInner>>,
    store: ChainStore,
    config: Arc<ChainConfig>,
}

impl Chain {
    /// Open the chain at `data_dir`: load prior state when a genesis marker
    /// exists, otherwise create and persist a fresh genesis with the
    /// configured initial accounts.
    pub fn open(config: ChainConfig, data_dir: &Path) -> Result<Chain> {
        let store = ChainStore::open(data_dir)?;

        let inner = if store.genesis_exists() {
            let blocks = store.load_blocks()?;
            let accounts = store.load_accounts()?;
            let last = blocks.last().ok_or_else(|| {
                ChainError::Storage("Block file exists but holds no blocks".to_string())
            })?;
            let height = last.header.height;
            let last_hash = last.header.hash;
            info!("Resuming chain at height {height}");
            ChainInner {
                blocks,
                accounts,
                mempool: MemoryPool::new(),
                height,
                last_hash,
            }
        } else {
            let genesis_time = match config.genesis_time {
                Some(pinned) => pinned,
                None => current_timestamp()?,
            };
            let genesis = Block::genesis(genesis_time)?;
            let mut accounts = HashMap::new();
            for account in &config.genesis_accounts {
                accounts.insert(account.address, account.clone());
            }

            store.save_genesis(&genesis)?;
            store.save_state(std::slice::from_ref(&genesis), None, &accounts)?;
            info!(
                "Created genesis block {} with {} initial accounts",
                genesis.header.hash,
                accounts.len()
            );

            let last_hash = genesis.header.hash;
            ChainInner {
                blocks: vec![genesis],
                accounts,
                mempool: MemoryPool::new(),
                height: 0,
                last_hash,
            }
        };

        Ok(Chain {
            inner: Arc::new(RwLock::new(inner)),
            store,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Validate a transaction and admit it to the mempool
    pub fn add_transaction(&self, tx: &Transaction) -> Result<Hash> {
        let mut inner = self.write_lock();

        tx.check_well_formed()?;

        if tx.tx_type == TxType::Transfer {
            let available = inner
                .accounts
                .get(&tx.from)
                .map(|a| a.balance)
                .unwrap_or(0);
            if available < tx.amount {
                return Err(ChainError::InsufficientBalance {
                    required: tx.amount,
                    available,
                });
            }
        }

        if inner.mempool.contains(&tx.hash) {
            return Err(ChainError::DuplicateTx(tx.hash.to_string()));
        }

        inner.mempool.add(tx.clone());
        info!(
            "Admitted {} transaction {} ({} pending)",
            tx.tx_type,
            tx.hash,
            inner.mempool.len()
        );
        Ok(tx.hash)
    }

    /// Validate a block and apply it. State transitions are staged on a
    /// copy and committed only after the new state is persisted.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let mut inner = self.write_lock();

        let expected = inner.height + 1;
        if block.header.height != expected {
            return Err(ChainError::BadHeight {
                expected,
                actual: block.header.height,
            });
        }

        if block.header.prev_hash != inner.last_hash {
            return Err(ChainError::BadPrevHash(format!(
                "expected {}, got {}",
                inner.last_hash, block.header.prev_hash
            )));
        }

        let computed = block.compute_hash()?;
        if computed != block.header.hash {
            return Err(ChainError::BadBlockHash(format!(
                "expected {computed}, got {}",
                block.header.hash
            )));
        }

        if !block.verify_merkle_root() {
            return Err(ChainError::BadMerkleRoot(format!(
                "root {} does not cover the block's transactions",
                block.header.merkle_root
            )));
        }

        // Stage every transaction against a copy of the account map; the
        // chain stays untouched until the staged state is durable.
        let mut staged = inner.accounts.clone();
        for tx in &block.transactions {
            apply_transaction(&mut staged, tx, &self.config)?;
        }

        if let Err(e) = self.store.save_state(&inner.blocks, Some(block), &staged) {
            warn!("Rejecting block {}: persistence failed", block.header.hash);
            return Err(e);
        }

        inner.accounts = staged;
        for tx in &block.transactions {
            inner.mempool.remove(&tx.hash);
        }
        inner.height = block.header.height;
        inner.last_hash = block.header.hash;
        inner.blocks.push(block.clone());

        info!(
            "Applied block #{} {} with {} transactions",
            block.header.height,
            block.header.hash,
            block.transactions.len()
        );
        Ok(())
    }

    /// The stored account, or a zero account for unknown addresses
    pub fn get_account(&self, address: &Address) -> Account {
        let inner = self.read_lock();
        inner
            .accounts
            .get(address)
            .cloned()
            .unwrap_or_else(|| Account::empty(*address))
    }

    pub fn height(&self) -> i64 {
        self.read_lock().height
    }

    pub fn last_block(&self) -> Block {
        let inner = self.read_lock();
        inner
            .blocks
            .last()
            .cloned()
            .expect("Chain always holds at least the genesis block")
    }

    /// Snapshot up to `limit` pending transactions in admission order
    pub fn pending_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.read_lock().mempool.pending(limit)
    }

    pub fn mempool_len(&self) -> usize {
        self.read_lock().mempool.len()
    }

    /// All blocks with height strictly greater than `height`, in order
    pub fn blocks_after(&self, height: i64) -> Vec<Block> {
        let inner = self.read_lock();
        inner
            .blocks
            .iter()
            .filter(|b| b.header.height > height)
            .cloned()
            .collect()
    }

    /// Persist the current state; used on shutdown
    pub fn flush(&self) -> Result<()> {
        let inner = self.read_lock();
        self.store.save_state(&inner.blocks, None, &inner.accounts)
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, ChainInner> {
        self.inner
            .read()
            .expect("Chain lock poisoned - this should never happen")
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, ChainInner> {
        self.inner
            .write()
            .expect("Chain lock poisoned - this should never happen")
    }
}

/// Validate a transaction against the staged state and apply its transition
fn apply_transaction(
    accounts: &mut HashMap<Address, Account>,
    tx: &Transaction,
    config: &ChainConfig,
) -> Result<()> {
    tx.check_well_formed()?;

    match tx.tx_type {
        TxType::Transfer => {
            let from_balance = accounts.get(&tx.from).map(|a| a.balance).unwrap_or(0);
            if from_balance < tx.amount {
                return Err(ChainError::InsufficientBalance {
                    required: tx.amount,
                    available: from_balance,
                });
            }

            let sender = accounts
                .entry(tx.from)
                .or_insert_with(|| Account::empty(tx.from));
            sender.balance -= tx.amount;
            sender.nonce += 1;

            let recipient = accounts
                .entry(tx.to)
                .or_insert_with(|| Account::empty(tx.to));
            recipient.balance += tx.amount;
        }
        TxType::PatchSubmit => {
            let submitter = accounts
                .entry(tx.from)
                .or_insert_with(|| Account::empty(tx.from));
            submitter.balance += config.initial_reward;
            submitter.nonce += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::PatchSet;
    use crate::utils::NodeKeyPair;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn test_chain_with_balance(key_pair: &NodeKeyPair, balance: i64) -> (Chain, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = ChainConfig {
            genesis_accounts: vec![Account {
                address: key_pair.address(),
                balance,
                nonce: 0,
            }],
            ..ChainConfig::default()
        };
        let chain = Chain::open(config, dir.path()).unwrap();
        (chain, dir)
    }

    fn signed_transfer(key_pair: &NodeKeyPair, to: Address, amount: i64, nonce: i64) -> Transaction {
        let mut tx = Transaction::new_transfer(key_pair.address(), to, amount, nonce).unwrap();
        tx.sign(key_pair).unwrap();
        tx
    }

    fn signed_patch_submit(key_pair: &NodeKeyPair, nonce: i64) -> Transaction {
        let mut files = BTreeMap::new();
        files.insert("patch.diff".to_string(), "--- a\n+++ b\n".to_string());
        let patch = PatchSet {
            id: "ps-1".to_string(),
            problem_id: "prob-1".to_string(),
            author: key_pair.address(),
            code: String::new(),
            language: "diff".to_string(),
            files,
            timestamp: 1_700_000_000,
            signature: Vec::new(),
        };
        let mut tx = Transaction::new_patch_submit(key_pair.address(), patch, nonce).unwrap();
        tx.sign(key_pair).unwrap();
        tx
    }

    fn produce_block(chain: &Chain, validator: Address) -> Block {
        let pending = chain.pending_transactions(chain.config().max_tx_per_block);
        let last = chain.last_block();
        Block::new(last.header.height + 1, last.header.hash, pending, validator).unwrap()
    }

    fn total_balance(chain: &Chain, addresses: &[Address]) -> i64 {
        addresses
            .iter()
            .map(|a| chain.get_account(a).balance)
            .sum()
    }

    #[test]
    fn test_fresh_chain_starts_at_genesis() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        assert_eq!(chain.height(), 0);
        let genesis = chain.last_block();
        assert_eq!(genesis.header.height, 0);
        assert!(genesis.header.prev_hash.is_zero());
        assert!(genesis.transactions.is_empty());
        assert_eq!(chain.get_account(&key_pair.address()).balance, 1000);
    }

    #[test]
    fn test_reopen_keeps_identical_genesis() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let dir = tempdir().unwrap();
        let config = ChainConfig {
            genesis_accounts: vec![Account {
                address: key_pair.address(),
                balance: 1000,
                nonce: 0,
            }],
            ..ChainConfig::default()
        };

        let first = Chain::open(config.clone(), dir.path()).unwrap();
        let genesis = first.last_block();
        drop(first);

        let second = Chain::open(config, dir.path()).unwrap();
        assert_eq!(second.last_block(), genesis);
        assert_eq!(second.height(), 0);
    }

    #[test]
    fn test_unknown_account_is_zero() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        let unknown = Address::from_public_key(&[0xEE; 64]);
        let account = chain.get_account(&unknown);
        assert_eq!(account.balance, 0);
        assert_eq!(account.nonce, 0);
    }

    #[test]
    fn test_transfer_applies_balances_and_nonce() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);
        let recipient = Address::from_public_key(&[0x11; 64]);

        let tx = signed_transfer(&key_pair, recipient, 100, 0);
        chain.add_transaction(&tx).unwrap();
        assert_eq!(chain.mempool_len(), 1);

        let block = produce_block(&chain, key_pair.address());
        chain.add_block(&block).unwrap();

        assert_eq!(chain.height(), 1);
        assert_eq!(chain.mempool_len(), 0);

        let sender = chain.get_account(&key_pair.address());
        assert_eq!(sender.balance, 900);
        assert_eq!(sender.nonce, 1);

        let receiver = chain.get_account(&recipient);
        assert_eq!(receiver.balance, 100);
        assert_eq!(receiver.nonce, 0);

        // Transfers conserve total supply
        assert_eq!(
            total_balance(&chain, &[key_pair.address(), recipient]),
            1000
        );
    }

    #[test]
    fn test_insufficient_balance_is_rejected() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);
        let recipient = Address::from_public_key(&[0x22; 64]);

        let tx = signed_transfer(&key_pair, recipient, 10_000, 0);
        assert!(matches!(
            chain.add_transaction(&tx),
            Err(ChainError::InsufficientBalance {
                required: 10_000,
                available: 1000,
            })
        ));
        assert_eq!(chain.mempool_len(), 0);
    }

    #[test]
    fn test_duplicate_admission_is_rejected_once() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);
        let recipient = Address::from_public_key(&[0x33; 64]);

        let tx = signed_transfer(&key_pair, recipient, 10, 0);
        chain.add_transaction(&tx).unwrap();
        assert!(matches!(
            chain.add_transaction(&tx),
            Err(ChainError::DuplicateTx(_))
        ));
        assert_eq!(chain.mempool_len(), 1);
    }

    #[test]
    fn test_patch_submit_credits_reward() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        let tx = signed_patch_submit(&key_pair, 0);
        chain.add_transaction(&tx).unwrap();

        let block = produce_block(&chain, key_pair.address());
        chain.add_block(&block).unwrap();

        let account = chain.get_account(&key_pair.address());
        assert_eq!(
            account.balance,
            1000 + chain.config().initial_reward
        );
        assert_eq!(account.nonce, 1);
    }

    #[test]
    fn test_block_at_occupied_height_is_rejected() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        let block = produce_block(&chain, key_pair.address());
        chain.add_block(&block).unwrap();

        // A competing block for the same height loses
        let competing = Block::new(
            1,
            chain.last_block().header.prev_hash,
            Vec::new(),
            key_pair.address(),
        )
        .unwrap();
        assert!(matches!(
            chain.add_block(&competing),
            Err(ChainError::BadHeight {
                expected: 2,
                actual: 1,
            })
        ));
    }

    #[test]
    fn test_bad_prev_hash_is_rejected() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        let block = Block::new(1, Hash::of(b"wrong"), Vec::new(), key_pair.address()).unwrap();
        assert!(matches!(
            chain.add_block(&block),
            Err(ChainError::BadPrevHash(_))
        ));
    }

    #[test]
    fn test_tampered_block_hash_is_rejected() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        let mut block = produce_block(&chain, key_pair.address());
        block.header.hash = Hash::of(b"forged");
        assert!(matches!(
            chain.add_block(&block),
            Err(ChainError::BadBlockHash(_))
        ));
    }

    #[test]
    fn test_tampered_merkle_root_is_rejected() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);
        let recipient = Address::from_public_key(&[0x44; 64]);

        let tx = signed_transfer(&key_pair, recipient, 10, 0);
        chain.add_transaction(&tx).unwrap();

        let mut block = produce_block(&chain, key_pair.address());
        block.header.merkle_root = Hash::of(b"forged root");
        block.header.hash = block.compute_hash().unwrap();
        assert!(matches!(
            chain.add_block(&block),
            Err(ChainError::BadMerkleRoot(_))
        ));
    }

    #[test]
    fn test_rejected_block_leaves_state_untouched() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);
        let recipient = Address::from_public_key(&[0x55; 64]);

        // A block whose transaction overdraws fails as a whole
        let mut overdraw =
            Transaction::new_transfer(key_pair.address(), recipient, 5000, 0).unwrap();
        overdraw.sign(&key_pair).unwrap();
        let last = chain.last_block();
        let block = Block::new(1, last.header.hash, vec![overdraw], key_pair.address()).unwrap();

        assert!(matches!(
            chain.add_block(&block),
            Err(ChainError::InsufficientBalance { .. })
        ));
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.get_account(&key_pair.address()).balance, 1000);
        assert_eq!(chain.get_account(&recipient).balance, 0);
    }

    #[test]
    fn test_chain_linkage_across_blocks() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        for _ in 0..3 {
            let block = produce_block(&chain, key_pair.address());
            chain.add_block(&block).unwrap();
        }

        let blocks = chain.blocks_after(-1);
        assert_eq!(blocks.len(), 4);
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].header.height, pair[0].header.height + 1);
            assert_eq!(pair[1].header.prev_hash, pair[0].header.hash);
        }
    }

    #[test]
    fn test_blocks_after_returns_suffix_in_order() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);

        for _ in 0..4 {
            let block = produce_block(&chain, key_pair.address());
            chain.add_block(&block).unwrap();
        }

        let suffix = chain.blocks_after(2);
        assert_eq!(suffix.len(), 2);
        assert_eq!(suffix[0].header.height, 3);
        assert_eq!(suffix[1].header.height, 4);
    }

    #[test]
    fn test_restart_preserves_height_and_balances() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let recipient = Address::from_public_key(&[0x66; 64]);
        let dir = tempdir().unwrap();
        let config = ChainConfig {
            genesis_accounts: vec![Account {
                address: key_pair.address(),
                balance: 1000,
                nonce: 0,
            }],
            ..ChainConfig::default()
        };

        {
            let chain = Chain::open(config.clone(), dir.path()).unwrap();
            let tx = signed_transfer(&key_pair, recipient, 250, 0);
            chain.add_transaction(&tx).unwrap();
            let block = produce_block(&chain, key_pair.address());
            chain.add_block(&block).unwrap();
            assert_eq!(chain.height(), 1);
        }

        let reopened = Chain::open(config, dir.path()).unwrap();
        assert_eq!(reopened.height(), 1);
        assert_eq!(reopened.get_account(&key_pair.address()).balance, 750);
        assert_eq!(reopened.get_account(&recipient).balance, 250);
        // Mempool never survives a restart
        assert_eq!(reopened.mempool_len(), 0);
    }

    #[test]
    fn test_nonces_never_decrease() {
        let key_pair = NodeKeyPair::generate().unwrap();
        let (chain, _dir) = test_chain_with_balance(&key_pair, 1000);
        let recipient = Address::from_public_key(&[0x77; 64]);

        let mut last_nonce = 0;
        for nonce in 0..3 {
            let tx = signed_transfer(&key_pair, recipient, 10, nonce);
            chain.add_transaction(&tx).unwrap();
            let block = produce_block(&chain, key_pair.address());
            chain.add_block(&block).unwrap();

            let current = chain.get_account(&key_pair.address()).nonce;
            assert!(current >= last_nonce);
            last_nonce = current;
        }
        assert_eq!(last_nonce, 3);
    }
}
