// On-disk chain state. Blocks live in blocks.json as an ordered array,
// accounts in accounts.json as an unordered list, and genesis.json marks an
// initialized data directory. Every write lands in a .tmp sibling first and
// is moved into place with a rename, so a crash never leaves a torn file.

use crate::core::types::{Account, Address};
use crate::core::Block;
use crate::error::{ChainError, Result};
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const BLOCKS_FILE: &str = "blocks.json";
const ACCOUNTS_FILE: &str = "accounts.json";
const GENESIS_FILE: &str = "genesis.json";

#[derive(Debug, Clone)]
pub struct ChainStore {
    dir: PathBuf,
}

impl ChainStore {
    pub fn open(dir: &Path) -> Result<ChainStore> {
        fs::create_dir_all(dir)
            .map_err(|e| ChainError::Storage(format!("Failed to create {}: {e}", dir.display())))?;
        Ok(ChainStore {
            dir: dir.to_path_buf(),
        })
    }

    /// A data directory is initialized once its genesis marker exists
    pub fn genesis_exists(&self) -> bool {
        self.dir.join(GENESIS_FILE).exists()
    }

    pub fn save_genesis(&self, genesis: &Block) -> Result<()> {
        let data = serde_json::to_vec_pretty(genesis)
            .map_err(|e| ChainError::Storage(format!("Failed to encode genesis: {e}")))?;
        self.write_atomic(GENESIS_FILE, &data)
    }

    pub fn load_genesis(&self) -> Result<Block> {
        let data = fs::read(self.dir.join(GENESIS_FILE))
            .map_err(|e| ChainError::Storage(format!("Failed to read genesis: {e}")))?;
        serde_json::from_slice(&data)
            .map_err(|e| ChainError::Decoding(format!("Corrupt genesis record: {e}")))
    }

    /// Rewrite both state files. `extra` lets the caller persist a candidate
    /// block without mutating its in-memory chain first.
    pub fn save_state(
        &self,
        blocks: &[Block],
        extra: Option<&Block>,
        accounts: &HashMap<Address, Account>,
    ) -> Result<()> {
        let all: Vec<&Block> = blocks.iter().chain(extra).collect();
        let block_data = serde_json::to_vec_pretty(&all)
            .map_err(|e| ChainError::Storage(format!("Failed to encode blocks: {e}")))?;
        self.write_atomic(BLOCKS_FILE, &block_data)?;

        let account_list: Vec<&Account> = accounts.values().collect();
        let account_data = serde_json::to_vec_pretty(&account_list)
            .map_err(|e| ChainError::Storage(format!("Failed to encode accounts: {e}")))?;
        self.write_atomic(ACCOUNTS_FILE, &account_data)
    }

    pub fn load_blocks(&self) -> Result<Vec<Block>> {
        let data = fs::read(self.dir.join(BLOCKS_FILE))
            .map_err(|e| ChainError::Storage(format!("Failed to read blocks: {e}")))?;
        let blocks: Vec<Block> = serde_json::from_slice(&data)
            .map_err(|e| ChainError::Decoding(format!("Corrupt block record: {e}")))?;
        info!("Loaded {} blocks from {}", blocks.len(), self.dir.display());
        Ok(blocks)
    }

    pub fn load_accounts(&self) -> Result<HashMap<Address, Account>> {
        let data = fs::read(self.dir.join(ACCOUNTS_FILE))
            .map_err(|e| ChainError::Storage(format!("Failed to read accounts: {e}")))?;
        let list: Vec<Account> = serde_json::from_slice(&data)
            .map_err(|e| ChainError::Decoding(format!("Corrupt account record: {e}")))?;

        let mut accounts = HashMap::with_capacity(list.len());
        for account in list {
            accounts.insert(account.address, account);
        }
        Ok(accounts)
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, data)
            .map_err(|e| ChainError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &target).map_err(|e| {
            ChainError::Storage(format!("Failed to move {} into place: {e}", tmp.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_genesis_marker_round_trip() {
        let dir = tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        assert!(!store.genesis_exists());

        let genesis = Block::genesis(1_700_000_000).unwrap();
        store.save_genesis(&genesis).unwrap();
        assert!(store.genesis_exists());
        assert_eq!(store.load_genesis().unwrap(), genesis);
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();

        let genesis = Block::genesis(1_700_000_000).unwrap();
        let next = Block::new(1, genesis.header.hash, Vec::new(), Address::zero()).unwrap();

        let mut accounts = HashMap::new();
        let addr = Address::from_public_key(&[5u8; 64]);
        accounts.insert(
            addr,
            Account {
                address: addr,
                balance: 1000,
                nonce: 2,
            },
        );

        store
            .save_state(std::slice::from_ref(&genesis), Some(&next), &accounts)
            .unwrap();

        let blocks = store.load_blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], genesis);
        assert_eq!(blocks[1], next);

        let loaded = store.load_accounts().unwrap();
        assert_eq!(loaded.get(&addr).unwrap().balance, 1000);
        assert_eq!(loaded.get(&addr).unwrap().nonce, 2);
    }

    #[test]
    fn test_rewrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        let genesis = Block::genesis(1_700_000_000).unwrap();

        for _ in 0..3 {
            store
                .save_state(std::slice::from_ref(&genesis), None, &HashMap::new())
                .unwrap();
        }

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_missing_state_fails() {
        let dir = tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        assert!(store.load_blocks().is_err());
        assert!(store.load_accounts().is_err());
    }
}
