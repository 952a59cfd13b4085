use crate::error::{ChainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const HASH_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 20;

/// 32-byte SHA-256 digest.
///
/// Displayed as lowercase hex without a prefix; the JSON form is the display
/// form. The canonical (hashed, signed, persisted) form is the raw 32 bytes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, bincode::Encode,
    bincode::Decode,
)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// SHA-256 of the given bytes
    pub fn of(data: &[u8]) -> Hash {
        let digest = sha256_digest(data);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Hash {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn parse(s: &str) -> Result<Hash> {
        let bytes = HEXLOWER
            .decode(s.to_lowercase().as_bytes())
            .map_err(|e| ChainError::Decoding(format!("Invalid hash encoding: {e}")))?;
        if bytes.len() != HASH_LEN {
            return Err(ChainError::Decoding(format!(
                "Invalid hash length: {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::parse(&s).map_err(D::Error::custom)
    }
}

/// 20-byte account identifier.
///
/// Derived from a P-256 public key by hashing the `X ∥ Y` coordinate
/// concatenation with SHA-256 and keeping the last 20 bytes. Displayed as
/// `0x` followed by 40 lowercase hex characters.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, bincode::Encode,
    bincode::Decode,
)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn zero() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    /// Derive an address from the 64-byte public key coordinates
    pub fn from_public_key(coords: &[u8]) -> Address {
        let digest = sha256_digest(coords);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
        Address(out)
    }

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Address {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Address> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        let bytes = HEXLOWER
            .decode(hex.to_lowercase().as_bytes())
            .map_err(|e| ChainError::InvalidAddress(format!("{s}: {e}")))?;
        if bytes.len() != ADDRESS_LEN {
            return Err(ChainError::InvalidAddress(format!(
                "{s}: invalid length {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", HEXLOWER.encode(&self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(D::Error::custom)
    }
}

/// Account state tracked by the chain engine. Accounts are created
/// implicitly on first reference with zero balance and zero nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Account {
    pub address: Address,
    pub balance: i64,
    #[serde(default)]
    pub nonce: i64,
}

impl Account {
    pub fn empty(address: Address) -> Account {
        Account {
            address,
            balance: 0,
            nonce: 0,
        }
    }
}

/// Serde adapter rendering byte fields as lowercase hex strings in JSON
pub mod hex_bytes {
    use data_encoding::HEXLOWER;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&HEXLOWER.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        HEXLOWER
            .decode(s.to_lowercase().as_bytes())
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_display_and_parse() {
        let hash = Hash::of(b"devnet");
        let displayed = hash.to_string();
        assert_eq!(displayed.len(), 64);
        assert_eq!(Hash::parse(&displayed).unwrap(), hash);
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash::zero().is_zero());
        assert!(!Hash::of(b"x").is_zero());
    }

    #[test]
    fn test_address_display_and_parse() {
        let addr = Address::from_public_key(&[7u8; 64]);
        let displayed = addr.to_string();
        assert!(displayed.starts_with("0x"));
        assert_eq!(displayed.len(), 42);
        assert_eq!(Address::parse(&displayed).unwrap(), addr);
        // The 0x prefix is optional on input
        assert_eq!(Address::parse(&displayed[2..]).unwrap(), addr);
    }

    #[test]
    fn test_address_parse_rejects_bad_input() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("not-an-address").is_err());
        assert!(Address::parse("0xZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ").is_err());
    }

    #[test]
    fn test_address_uses_last_twenty_digest_bytes() {
        let coords = [3u8; 64];
        let digest = sha256_digest(&coords);
        let addr = Address::from_public_key(&coords);
        assert_eq!(addr.as_bytes(), &digest[12..]);
    }

    #[test]
    fn test_json_round_trip() {
        let hash = Hash::of(b"roundtrip");
        let encoded = serde_json::to_string(&hash).unwrap();
        let decoded: Hash = serde_json::from_str(&encoded).unwrap();
        assert_eq!(hash, decoded);

        let account = Account {
            address: Address::from_public_key(&[9u8; 64]),
            balance: 1000,
            nonce: 3,
        };
        let encoded = serde_json::to_string(&account).unwrap();
        let decoded: Account = serde_json::from_str(&encoded).unwrap();
        assert_eq!(account, decoded);
    }
}
