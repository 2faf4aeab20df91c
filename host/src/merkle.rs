use rewards_core::{hash_pair, Hash};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("cannot build a merkle tree from zero leaves")]
    Empty,

    #[error("duplicate leaf 0x{}", hex_lower(.0))]
    DuplicateLeaf(Hash),

    #[error("leaf index {index} out of bounds ({len} leaves)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("leaf not in tree")]
    UnknownLeaf,
}

fn hex_lower(hash: &Hash) -> String {
    rewards_core::hash_to_hex(hash)[2..].to_string()
}

/// A sorted-pair Merkle tree over reward leaves
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Every layer from the (sorted) leaves up to the single root node
    layers: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes.
    ///
    /// Leaves are put in canonical order (ascending by hash) first, so the
    /// same set of leaves always yields the same root and proofs no matter
    /// how the caller ordered them.
    pub fn new(leaves: &[Hash]) -> Result<Self, TreeError> {
        if leaves.is_empty() {
            return Err(TreeError::Empty);
        }

        let mut sorted = leaves.to_vec();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(TreeError::DuplicateLeaf(pair[0]));
        }

        let mut layers = vec![sorted];
        while layers[layers.len() - 1].len() > 1 {
            let next = Self::next_layer(&layers[layers.len() - 1]);
            layers.push(next);
        }

        Ok(MerkleTree { layers })
    }

    /// Pair nodes left to right; a lone trailing node moves up unchanged
    fn next_layer(current: &[Hash]) -> Vec<Hash> {
        current
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [lone] => *lone,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect()
    }

    /// Get the root hash
    pub fn root(&self) -> Hash {
        self.layers[self.layers.len() - 1][0]
    }

    /// Leaves in canonical order
    pub fn leaves(&self) -> &[Hash] {
        &self.layers[0]
    }

    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    /// Number of layers above the leaves
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Position of a leaf in canonical order
    pub fn index_of(&self, leaf: &Hash) -> Option<usize> {
        self.layers[0].binary_search(leaf).ok()
    }

    /// Get the Merkle proof for the leaf at `index` (canonical order)
    pub fn proof(&self, index: usize) -> Result<Vec<Hash>, TreeError> {
        if index >= self.len() {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }

        let mut proof = Vec::with_capacity(self.depth());
        let mut current_index = index;

        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = current_index ^ 1;
            // Promoted nodes have no sibling on this layer
            if sibling < layer.len() {
                proof.push(layer[sibling]);
            }
            current_index /= 2;
        }

        Ok(proof)
    }

    /// Get the Merkle proof for a leaf by value
    pub fn proof_for(&self, leaf: &Hash) -> Result<Vec<Hash>, TreeError> {
        let index = self.index_of(leaf).ok_or(TreeError::UnknownLeaf)?;
        self.proof(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rewards_core::{compute_leaf, verify_merkle_proof, Address, U256};

    fn leaves(n: u8) -> Vec<Hash> {
        (1..=n)
            .map(|i| compute_leaf(&Address::repeat(i), 1, &Address::repeat(0xee), U256::from(i)))
            .collect()
    }

    #[test]
    fn test_merkle_tree_empty() {
        assert_eq!(MerkleTree::new(&[]).unwrap_err(), TreeError::Empty);
    }

    #[test]
    fn test_merkle_tree_single() {
        let leaf = leaves(1)[0];
        let tree = MerkleTree::new(&[leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert!(tree.proof(0).unwrap().is_empty());
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_merkle_tree_two() {
        let l = leaves(2);
        let tree = MerkleTree::new(&l).unwrap();
        assert_eq!(tree.root(), hash_pair(&l[0], &l[1]));
        assert_eq!(tree.proof_for(&l[0]).unwrap(), vec![l[1]]);
        assert_eq!(tree.proof_for(&l[1]).unwrap(), vec![l[0]]);
    }

    #[test]
    fn test_odd_node_is_promoted() {
        let l = leaves(3);
        let tree = MerkleTree::new(&l).unwrap();
        let s = tree.leaves().to_vec();

        let expected = hash_pair(&hash_pair(&s[0], &s[1]), &s[2]);
        assert_eq!(tree.root(), expected);
        // The promoted leaf only needs the other subtree
        assert_eq!(tree.proof(2).unwrap(), vec![hash_pair(&s[0], &s[1])]);
        assert_eq!(tree.proof(0).unwrap(), vec![s[1], s[2]]);
    }

    #[test]
    fn test_merkle_proof() {
        for n in 1..=17u8 {
            let l = leaves(n);
            let tree = MerkleTree::new(&l).unwrap();
            for leaf in &l {
                let proof = tree.proof_for(leaf).unwrap();
                assert!(
                    verify_merkle_proof(leaf, &proof, &tree.root()),
                    "proof for leaf in tree of {} should be valid",
                    n
                );
            }
        }
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let l = leaves(9);
        let mut reversed = l.clone();
        reversed.reverse();

        let a = MerkleTree::new(&l).unwrap();
        let b = MerkleTree::new(&reversed).unwrap();
        assert_eq!(a.root(), b.root());
        assert_eq!(a.leaves(), b.leaves());
        for i in 0..a.len() {
            assert_eq!(a.proof(i).unwrap(), b.proof(i).unwrap());
        }
    }

    #[test]
    fn test_duplicate_leaf_rejected() {
        let mut l = leaves(3);
        l.push(l[1]);
        assert_eq!(MerkleTree::new(&l).unwrap_err(), TreeError::DuplicateLeaf(l[1]));
    }

    #[test]
    fn test_unknown_leaf_and_bad_index() {
        let tree = MerkleTree::new(&leaves(4)).unwrap();
        assert_eq!(tree.proof_for(&[0u8; 32]).unwrap_err(), TreeError::UnknownLeaf);
        assert_eq!(
            tree.proof(4).unwrap_err(),
            TreeError::IndexOutOfBounds { index: 4, len: 4 }
        );
    }

    fn leaf_set() -> impl Strategy<Value = Vec<Hash>> {
        prop::collection::btree_set(any::<[u8; 32]>(), 1..40)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn prop_rebuild_is_deterministic(l in leaf_set()) {
            let a = MerkleTree::new(&l).unwrap();
            let b = MerkleTree::new(&l).unwrap();
            prop_assert_eq!(a.root(), b.root());
            for i in 0..a.len() {
                prop_assert_eq!(a.proof(i).unwrap(), b.proof(i).unwrap());
            }
        }

        #[test]
        fn prop_every_proof_verifies(l in leaf_set()) {
            let tree = MerkleTree::new(&l).unwrap();
            for leaf in &l {
                let proof = tree.proof_for(leaf).unwrap();
                prop_assert!(verify_merkle_proof(leaf, &proof, &tree.root()));
            }
        }

        #[test]
        fn prop_flipped_proof_bit_fails(
            l in prop::collection::btree_set(any::<[u8; 32]>(), 2..40)
                .prop_map(|s| s.into_iter().collect::<Vec<_>>()),
            pick in any::<prop::sample::Index>(),
            elem in any::<prop::sample::Index>(),
            bit in 0usize..256,
        ) {
            let tree = MerkleTree::new(&l).unwrap();
            let leaf = l[pick.index(l.len())];
            let mut proof = tree.proof_for(&leaf).unwrap();
            let e = elem.index(proof.len());
            proof[e][bit / 8] ^= 1 << (bit % 8);
            prop_assert!(!verify_merkle_proof(&leaf, &proof, &tree.root()));
        }

        #[test]
        fn prop_changed_points_fail(
            points in prop::collection::btree_set(1u64..u64::MAX, 2..20),
            pick in any::<prop::sample::Index>(),
            bit in 0usize..64,
        ) {
            let token = Address::repeat(0xee);
            let facts: Vec<(Address, u64)> = points
                .iter()
                .enumerate()
                .map(|(i, p)| (Address::repeat(i as u8), *p))
                .collect();
            let l: Vec<Hash> = facts
                .iter()
                .map(|(a, p)| compute_leaf(a, 1, &token, U256::from(*p)))
                .collect();
            let tree = MerkleTree::new(&l).unwrap();

            let (addr, p) = facts[pick.index(facts.len())];
            let proof = tree.proof_for(&compute_leaf(&addr, 1, &token, U256::from(p))).unwrap();
            let forged = compute_leaf(&addr, 1, &token, U256::from(p ^ (1u64 << bit)));
            prop_assert!(!verify_merkle_proof(&forged, &proof, &tree.root()));
        }
    }
}
