//! # Agent Chain - Permissioned Devnet Node
//!
//! A small permissioned blockchain devnet: cooperating validator nodes
//! that produce blocks on a timer, propagate them over a TCP overlay,
//! maintain a mempool of pending transactions and expose a minimal HTTP
//! RPC surface to the command-line wallet.
//!
//! ## How the code is organized
//! - `core/`: data model, merkle root computation and the chain engine
//!   that owns blocks, accounts and the mempool
//! - `network/`: P2P host, typed message exchange and peer discovery
//! - `consensus/`: timer-driven block production and inbound handlers
//! - `storage/`: on-disk chain state and the in-memory transaction pool
//! - `rpc/`: the HTTP surface the wallet talks to
//! - `node/`: lifecycle wiring from config load to signal-driven shutdown
//! - `config/`, `error/`, `utils/`, `cli/`: the supporting cast

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod rpc;
pub mod storage;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::cli::{Command, Opt};
pub use crate::config::{ChainConfig, NodeConfig};
pub use crate::consensus::Engine;
pub use crate::core::{
    Account, Address, Block, BlockHeader, Chain, Hash, PatchSet, Transaction, TxType,
};
pub use crate::error::{ChainError, Result};
pub use crate::network::{Discovery, Message, Network, PROTOCOL_ID};
pub use crate::rpc::RpcServer;
pub use crate::storage::{ChainStore, MemoryPool};
pub use crate::utils::{
    current_timestamp, sha256_digest, verify_signature, NodeKeyPair, Shutdown,
};
