//! Cryptographic primitives, canonical serialization and shared runtime
//! helpers.

pub mod crypto;
pub mod serialization;
pub mod shutdown;

pub use crypto::{
    current_timestamp, sha256_digest, verify_signature, NodeKeyPair, PUBLIC_KEY_COORDS_LEN,
    SIGNATURE_LEN,
};
pub use serialization::{deserialize, serialize};
pub use shutdown::Shutdown;
