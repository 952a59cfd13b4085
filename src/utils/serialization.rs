// Canonical byte encoding used for hashing, signing and signature
// verification. Bincode with the standard configuration is deterministic:
// fields in declaration order, fixed-width integers, length-prefixed
// variable data. The JSON forms used on the wire and on disk are never
// hashed.
use crate::error::{ChainError, Result};

/// Serialize a value into its canonical bincode form
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| ChainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize a value from its canonical bincode form
pub fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| ChainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}
