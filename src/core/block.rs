use crate::core::merkle;
use crate::core::transaction::Transaction;
use crate::core::types::{Address, Hash};
use crate::error::Result;
use crate::utils::{current_timestamp, serialize};
use serde::{Deserialize, Serialize};

/// Difficulty carried by every devnet block. Production is timer driven,
/// so the field is fixed rather than adjusted.
pub const BLOCK_DIFFICULTY: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    pub height: i64,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: i64,
    pub difficulty: i64,
    pub nonce: i64,
    pub validator: Address,
    pub hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble and seal a block extending the chain at `prev_hash`
    pub fn new(
        height: i64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        validator: Address,
    ) -> Result<Block> {
        let mut block = Block {
            header: BlockHeader {
                height,
                prev_hash,
                merkle_root: Hash::zero(),
                timestamp: current_timestamp()?,
                difficulty: BLOCK_DIFFICULTY,
                nonce: 0,
                validator,
                hash: Hash::zero(),
            },
            transactions,
        };
        block.seal()?;
        Ok(block)
    }

    /// The height-0 block: zero previous hash, no transactions, the zero
    /// address as validator
    pub fn genesis(timestamp: i64) -> Result<Block> {
        let mut block = Block {
            header: BlockHeader {
                height: 0,
                prev_hash: Hash::zero(),
                merkle_root: Hash::zero(),
                timestamp,
                difficulty: BLOCK_DIFFICULTY,
                nonce: 0,
                validator: Address::zero(),
                hash: Hash::zero(),
            },
            transactions: Vec::new(),
        };
        block.seal()?;
        Ok(block)
    }

    pub fn merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash).collect();
        merkle::merkle_root(&hashes)
    }

    /// Header hash over the canonical header bytes with `hash` zeroed.
    /// The merkle root must already be installed.
    pub fn compute_hash(&self) -> Result<Hash> {
        let mut header = self.header.clone();
        header.hash = Hash::zero();
        Ok(Hash::of(&serialize(&header)?))
    }

    /// Install the merkle root, then the header hash
    pub fn seal(&mut self) -> Result<()> {
        self.header.merkle_root = self.merkle_root();
        self.header.hash = self.compute_hash()?;
        Ok(())
    }

    pub fn verify_merkle_root(&self) -> bool {
        self.merkle_root() == self.header.merkle_root
    }
}
