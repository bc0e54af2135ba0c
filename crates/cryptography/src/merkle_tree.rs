//! Merkle root computation over transaction hashes.

use crate::hash::hash256;

/// Pairwise double-SHA-256 Merkle tree with odd-node duplication.
pub struct MerkleTree;

impl MerkleTree {
    /// Computes the Merkle root of `hashes`.
    ///
    /// Returns the all-zero hash for an empty list (the root of an empty
    /// block), the element itself for a single-entry list, and otherwise
    /// folds pairs bottom-up, duplicating the last node of odd levels.
    pub fn compute_root(hashes: &[[u8; 32]]) -> [u8; 32] {
        match hashes.len() {
            0 => [0u8; 32],
            1 => hashes[0],
            _ => {
                let mut level: Vec<[u8; 32]> = hashes.to_vec();
                while level.len() > 1 {
                    if level.len() % 2 == 1 {
                        level.push(*level.last().expect("level is non-empty"));
                    }
                    level = level
                        .chunks_exact(2)
                        .map(|pair| {
                            let mut combined = [0u8; 64];
                            combined[..32].copy_from_slice(&pair[0]);
                            combined[32..].copy_from_slice(&pair[1]);
                            hash256(&combined)
                        })
                        .collect();
                }
                level[0]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> [u8; 32] {
        let mut h = [0u8; 32];
        h[0] = n;
        h
    }

    #[test]
    fn empty_list_yields_zero_root() {
        assert_eq!(MerkleTree::compute_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_hash_is_its_own_root() {
        assert_eq!(MerkleTree::compute_root(&[leaf(7)]), leaf(7));
    }

    #[test]
    fn pair_root_is_hash_of_concatenation() {
        let (a, b) = (leaf(1), leaf(2));
        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(&a);
        combined[32..].copy_from_slice(&b);
        assert_eq!(MerkleTree::compute_root(&[a, b]), hash256(&combined));
    }

    #[test]
    fn odd_count_duplicates_last_node() {
        // [a, b, c] must equal [a, b, c, c].
        let three = [leaf(1), leaf(2), leaf(3)];
        let four = [leaf(1), leaf(2), leaf(3), leaf(3)];
        assert_eq!(
            MerkleTree::compute_root(&three),
            MerkleTree::compute_root(&four)
        );
    }

    #[test]
    fn root_depends_on_order() {
        assert_ne!(
            MerkleTree::compute_root(&[leaf(1), leaf(2)]),
            MerkleTree::compute_root(&[leaf(2), leaf(1)])
        );
    }
}
