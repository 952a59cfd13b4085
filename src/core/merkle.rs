//! Merkle root computation over a block's transaction hashes.
//!
//! Adjacent hashes are paired and combined with SHA-256; an odd trailing
//! hash propagates unchanged to the next level. The empty list yields the
//! zero hash.

use crate::core::types::{Hash, HASH_LEN};

pub fn merkle_root(tx_hashes: &[Hash]) -> Hash {
    if tx_hashes.is_empty() {
        return Hash::zero();
    }

    let mut level = tx_hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            if i + 1 < level.len() {
                next.push(hash_pair(&level[i], &level[i + 1]));
                i += 2;
            } else {
                // odd trailing hash carries up unchanged
                next.push(level[i]);
                i += 1;
            }
        }
        level = next;
    }

    level[0]
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut combined = Vec::with_capacity(HASH_LEN * 2);
    combined.extend_from_slice(left.as_bytes());
    combined.extend_from_slice(right.as_bytes());
    Hash::of(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hashes(count: usize) -> Vec<Hash> {
        (0..count).map(|i| Hash::of(&[i as u8])).collect()
    }

    #[test]
    fn test_empty_list_yields_zero_root() {
        assert_eq!(merkle_root(&[]), Hash::zero());
    }

    #[test]
    fn test_single_hash_is_its_own_root() {
        let hashes = sample_hashes(1);
        assert_eq!(merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_pair_root_is_combined_hash() {
        let hashes = sample_hashes(2);
        let expected = hash_pair(&hashes[0], &hashes[1]);
        assert_eq!(merkle_root(&hashes), expected);
    }

    #[test]
    fn test_odd_trailing_hash_propagates_unchanged() {
        let hashes = sample_hashes(3);
        let left = hash_pair(&hashes[0], &hashes[1]);
        let expected = hash_pair(&left, &hashes[2]);
        assert_eq!(merkle_root(&hashes), expected);
    }

    #[test]
    fn test_root_depends_on_transaction_order() {
        let hashes = sample_hashes(4);
        let mut swapped = hashes.clone();
        swapped.swap(1, 2);
        assert_ne!(merkle_root(&hashes), merkle_root(&swapped));
    }

    #[test]
    fn test_root_is_deterministic() {
        let hashes = sample_hashes(7);
        assert_eq!(merkle_root(&hashes), merkle_root(&hashes));
    }
}
