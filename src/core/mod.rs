//! Core chain functionality
//!
//! This module contains the data model (hashes, addresses, accounts,
//! transactions, blocks), the merkle root computation and the chain engine
//! that owns all state.

pub mod block;
pub mod chain;
pub mod merkle;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockHeader, BLOCK_DIFFICULTY};
pub use chain::Chain;
pub use transaction::{PatchSet, Transaction, TxType};
pub use types::{Account, Address, Hash, ADDRESS_LEN, HASH_LEN};
