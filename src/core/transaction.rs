// Transactions come in two classes: plain balance transfers and patch
// submissions that credit the submitter a fixed reward on inclusion. The
// hash covers the canonical bytes of the transaction with hash and
// signature zeroed, and the signature is produced over exactly those same
// bytes.

use crate::core::types::{hex_bytes, Address, Hash};
use crate::error::{ChainError, Result};
use crate::utils::{current_timestamp, serialize, verify_signature, NodeKeyPair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transaction class tags. Stake, unstake and claim-reward types seen in
/// wallet tooling are not chain operations and are rejected at decode time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transfer,
    PatchSubmit,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Transfer => write!(f, "transfer"),
            TxType::PatchSubmit => write!(f, "patch_submit"),
        }
    }
}

/// A code submission payload. The chain treats it as an inert blob: its
/// inclusion pays the fixed reward but no test execution happens on-chain.
/// `files` is ordered so the canonical bytes are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct PatchSet {
    pub id: String,
    pub problem_id: String,
    pub author: Address,
    pub code: String,
    pub language: String,
    pub files: BTreeMap<String, String>,
    pub timestamp: i64,
    #[serde(with = "hex_bytes", default)]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub from: Address,
    pub to: Address,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub patch_set: Option<PatchSet>,
    pub timestamp: i64,
    pub nonce: i64,
    #[serde(with = "hex_bytes", default)]
    pub signature: Vec<u8>,
    pub hash: Hash,
}

impl Transaction {
    /// Build an unsigned transfer; `sign` seals it
    pub fn new_transfer(from: Address, to: Address, amount: i64, nonce: i64) -> Result<Transaction> {
        Ok(Transaction {
            tx_type: TxType::Transfer,
            from,
            to,
            amount,
            patch_set: None,
            timestamp: current_timestamp()?,
            nonce,
            signature: Vec::new(),
            hash: Hash::zero(),
        })
    }

    /// Build an unsigned patch submission; `sign` seals it
    pub fn new_patch_submit(from: Address, patch_set: PatchSet, nonce: i64) -> Result<Transaction> {
        Ok(Transaction {
            tx_type: TxType::PatchSubmit,
            from,
            to: Address::zero(),
            amount: 0,
            patch_set: Some(patch_set),
            timestamp: current_timestamp()?,
            nonce,
            signature: Vec::new(),
            hash: Hash::zero(),
        })
    }

    /// Canonical bytes: the transaction with `hash` zeroed and `signature`
    /// emptied. Both hashing and signing operate on this form.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut copy = self.clone();
        copy.hash = Hash::zero();
        copy.signature = Vec::new();
        serialize(&copy)
    }

    pub fn compute_hash(&self) -> Result<Hash> {
        Ok(Hash::of(&self.canonical_bytes()?))
    }

    /// Sign the canonical bytes and derive the hash over the same bytes
    pub fn sign(&mut self, key_pair: &NodeKeyPair) -> Result<()> {
        let bytes = self.canonical_bytes()?;
        self.signature = key_pair.sign(&bytes)?;
        self.hash = Hash::of(&bytes);
        Ok(())
    }

    /// Verify the stored signature against the given public key
    pub fn verify(&self, public_key: &[u8]) -> bool {
        match self.canonical_bytes() {
            Ok(bytes) => verify_signature(public_key, &bytes, &self.signature),
            Err(_) => false,
        }
    }

    /// Reject structurally invalid transactions before they reach state
    /// application: hash binding, signature shape and per-type payload.
    pub fn check_well_formed(&self) -> Result<()> {
        let computed = self.compute_hash()?;
        if computed != self.hash {
            return Err(ChainError::BadHash(format!(
                "expected {computed}, got {}",
                self.hash
            )));
        }

        if self.signature.is_empty() {
            return Err(ChainError::BadSignature("missing signature".to_string()));
        }
        if self.signature.len() != crate::utils::SIGNATURE_LEN {
            return Err(ChainError::BadSignature(format!(
                "invalid signature length: {}",
                self.signature.len()
            )));
        }

        match self.tx_type {
            TxType::Transfer => {
                if self.amount < 0 {
                    return Err(ChainError::Decoding(
                        "transfer amount must be non-negative".to_string(),
                    ));
                }
            }
            TxType::PatchSubmit => {
                if self.patch_set.is_none() {
                    return Err(ChainError::Decoding("missing patch set".to_string()));
                }
            }
        }

        Ok(())
    }
}
