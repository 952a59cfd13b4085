//! Error handling for the chain node
//!
//! This module provides the error types shared by every subsystem:
//! the chain engine, the P2P overlay, the consensus loops and the RPC
//! surface.

use std::fmt;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Error types for chain node operations
#[derive(Debug, Clone)]
pub enum ChainError {
    /// Malformed input that could not be decoded (RPC payloads, wire
    /// messages, persisted records)
    Decoding(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Configuration errors
    Config(String),
    /// Transaction hash does not match its computed hash
    BadHash(String),
    /// Missing or malformed signature
    BadSignature(String),
    /// Block height does not extend the current chain
    BadHeight { expected: i64, actual: i64 },
    /// Block previous-hash does not match the chain tip
    BadPrevHash(String),
    /// Block header hash does not match its computed hash
    BadBlockHash(String),
    /// Block merkle root does not match its transactions
    BadMerkleRoot(String),
    /// Insufficient funds for a transfer
    InsufficientBalance { required: i64, available: i64 },
    /// Transaction already present in the mempool
    DuplicateTx(String),
    /// Network communication errors
    Network(String),
    /// Directed send to a peer that is not connected
    PeerNotFound(String),
    /// Transport failure on an open stream
    StreamError(String),
    /// Persistence I/O failures
    Storage(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Decoding(msg) => write!(f, "Decoding error: {msg}"),
            ChainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            ChainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ChainError::BadHash(msg) => write!(f, "Bad transaction hash: {msg}"),
            ChainError::BadSignature(msg) => write!(f, "Bad signature: {msg}"),
            ChainError::BadHeight { expected, actual } => {
                write!(f, "Bad height: expected {expected}, got {actual}")
            }
            ChainError::BadPrevHash(msg) => write!(f, "Bad previous hash: {msg}"),
            ChainError::BadBlockHash(msg) => write!(f, "Bad block hash: {msg}"),
            ChainError::BadMerkleRoot(msg) => write!(f, "Bad merkle root: {msg}"),
            ChainError::InsufficientBalance {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient balance: required {required}, available {available}"
                )
            }
            ChainError::DuplicateTx(hash) => write!(f, "Duplicate transaction: {hash}"),
            ChainError::Network(msg) => write!(f, "Network error: {msg}"),
            ChainError::PeerNotFound(peer) => write!(f, "Peer not found: {peer}"),
            ChainError::StreamError(msg) => write!(f, "Stream error: {msg}"),
            ChainError::Storage(msg) => write!(f, "Storage error: {msg}"),
            ChainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            ChainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            ChainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl ChainError {
    /// True when the error describes malformed caller input rather than a
    /// rejected-but-well-formed request. The RPC surface maps these to
    /// HTTP 400.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ChainError::Decoding(_) | ChainError::InvalidAddress(_) | ChainError::Config(_)
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ChainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ChainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChainError {
    fn from(err: serde_yaml::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}
