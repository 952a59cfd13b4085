use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};

use crate::core::types::Address;
use crate::error::{ChainError, Result};
use data_encoding::HEXLOWER;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed length of an encoded `r ∥ s` ECDSA P-256 signature
pub const SIGNATURE_LEN: usize = 64;

/// Length of the concatenated `X ∥ Y` public key coordinates
pub const PUBLIC_KEY_COORDS_LEN: usize = 64;

pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ChainError::Crypto(format!("System time error: {e}")))?
        .as_secs();

    if duration > i64::MAX as u64 {
        return Err(ChainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// ECDSA P-256 key pair backing a node identity.
///
/// The key material is held as the PKCS#8 document produced by ring; the
/// public key is the uncompressed SEC1 point (0x04 ∥ X ∥ Y). Signatures are
/// the fixed 64-byte `r ∥ s` encoding, and signing hashes the message with
/// SHA-256 internally.
#[derive(Clone)]
pub struct NodeKeyPair {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl NodeKeyPair {
    pub fn generate() -> Result<NodeKeyPair> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| ChainError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
            .as_ref()
            .to_vec();
        Self::from_pkcs8(pkcs8)
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<NodeKeyPair> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    ChainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(NodeKeyPair { pkcs8, public_key })
    }

    /// Parse key material from its hex-encoded PKCS#8 form, the format of
    /// the `node.key` file and the `private_key` config field.
    pub fn from_hex(hex: &str) -> Result<NodeKeyPair> {
        let bytes = HEXLOWER
            .decode(hex.trim().to_lowercase().as_bytes())
            .map_err(|e| ChainError::Decoding(format!("Invalid key encoding: {e}")))?;
        Self::from_pkcs8(bytes)
    }

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.pkcs8)
    }

    /// Uncompressed SEC1 public key point (65 bytes)
    pub fn public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    /// The 64-byte `X ∥ Y` coordinate concatenation the address is derived
    /// from
    pub fn coordinates(&self) -> &[u8] {
        &self.public_key[1..]
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self.coordinates())
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, self.pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    ChainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let signature = key_pair
            .sign(&rng, message)
            .map_err(|e| ChainError::Crypto(format!("Failed to sign message: {e}")))?
            .as_ref()
            .to_vec();
        Ok(signature)
    }
}

/// Verify a 64-byte `r ∥ s` signature against a public key given either as
/// the 64-byte coordinate concatenation or the 65-byte uncompressed point.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_LEN {
        return false;
    }

    let point: Vec<u8> = match public_key.len() {
        PUBLIC_KEY_COORDS_LEN => {
            let mut p = Vec::with_capacity(PUBLIC_KEY_COORDS_LEN + 1);
            p.push(0x04);
            p.extend_from_slice(public_key);
            p
        }
        65 if public_key[0] == 0x04 => public_key.to_vec(),
        _ => return false,
    };

    let peer_public_key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, point);
    peer_public_key.verify(message, signature).is_ok()
}
