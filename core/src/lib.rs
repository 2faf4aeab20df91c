//! Season-scoped Merkle reward distribution: shared protocol code.
//!
//! Everything here must agree byte-for-byte with the on-chain verifier:
//! leaves are `keccak256(abi.encodePacked(address, uint256, address, uint256))`
//! and inner nodes hash the two children after sorting them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

pub mod bank;
pub mod claim;
pub mod error;
pub mod fee;
pub mod ledger;

pub use primitive_types::U256;

pub use bank::{BankError, InMemoryBank, TokenBank};
pub use claim::{ClaimRequest, MAX_PROOF_LEN};
pub use error::{ErrorKind, LedgerError, ParseError};
pub use fee::{split_fee, FeeSplit, FEE_SCALE};
pub use ledger::{LedgerEvent, RewardDistributor, UNUSED_REWARDS_DELAY};

/// A 32-byte keccak256 digest (leaf, inner node or root)
pub type Hash = [u8; 32];

/// Width of the packed leaf preimage: address(20) + uint256(32) + address(20) + uint256(32)
pub const LEAF_PREIMAGE_LEN: usize = 20 + 32 + 20 + 32;

/// A 20-byte account or token identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Build a test/fixture address where every byte is `byte`
    pub const fn repeat(byte: u8) -> Self {
        Address([byte; 20])
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Address(parse_fixed_hex::<20>(s)?))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Decode `0x`-prefixed (or bare) hex into exactly `N` bytes
pub fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Parse a 32-byte hash from hex
pub fn parse_hash(s: &str) -> Result<Hash, ParseError> {
    parse_fixed_hex::<32>(s)
}

/// Render a hash as `0x`-prefixed lower-case hex
pub fn hash_to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a decimal unsigned integer of up to 256 bits
pub fn parse_u256(s: &str) -> Result<U256, ParseError> {
    let digits = s.trim();
    if digits.is_empty() {
        return Err(ParseError::InvalidNumber(s.to_string()));
    }
    U256::from_dec_str(digits).map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

/// keccak256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Big-endian uint256 word
pub fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// Packed leaf preimage, identical to Solidity's
/// `abi.encodePacked(address user, uint256 seasonId, address token, uint256 points)`
pub fn pack_leaf(
    address: &Address,
    season_id: u64,
    token: &Address,
    points: U256,
) -> [u8; LEAF_PREIMAGE_LEN] {
    let mut packed = [0u8; LEAF_PREIMAGE_LEN];
    packed[0..20].copy_from_slice(&address.0);
    packed[20..52].copy_from_slice(&u256_word(U256::from(season_id)));
    packed[52..72].copy_from_slice(&token.0);
    packed[72..104].copy_from_slice(&u256_word(points));
    packed
}

/// Compute the leaf hash for one (user, season, token, points) reward fact
pub fn compute_leaf(address: &Address, season_id: u64, token: &Address, points: U256) -> Hash {
    keccak256(&pack_leaf(address, season_id, token, points))
}

/// Compute an inner node. Children are ordered by byte value first, so the
/// result does not depend on which side each child came from.
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256::new();
    hasher.update(lo);
    hasher.update(hi);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Fold a proof onto a leaf and return the implied root
pub fn process_proof(leaf: &Hash, proof: &[Hash]) -> Hash {
    proof
        .iter()
        .fold(*leaf, |computed, sibling| hash_pair(&computed, sibling))
}

/// Verify a sorted-pair Merkle proof
pub fn verify_merkle_proof(leaf: &Hash, proof: &[Hash], root: &Hash) -> bool {
    process_proof(leaf, proof) == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hash_to_hex(&keccak256(&[])),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_pack_leaf_layout() {
        let user = Address::repeat(0x11);
        let token = Address::repeat(0x22);
        let packed = pack_leaf(&user, 7, &token, U256::from(0x0102u64));

        assert_eq!(&packed[0..20], &[0x11u8; 20]);
        assert_eq!(&packed[20..51], &[0u8; 31]);
        assert_eq!(packed[51], 7);
        assert_eq!(&packed[52..72], &[0x22u8; 20]);
        assert_eq!(&packed[72..102], &[0u8; 30]);
        assert_eq!(&packed[102..104], &[0x01, 0x02]);
    }

    #[test]
    fn test_compute_leaf() {
        let user = Address::repeat(1);
        let token = Address::repeat(2);
        let leaf = compute_leaf(&user, 1, &token, U256::from(25u64));
        assert_eq!(leaf, keccak256(&pack_leaf(&user, 1, &token, U256::from(25u64))));

        // Every field participates in the hash
        assert_ne!(leaf, compute_leaf(&user, 2, &token, U256::from(25u64)));
        assert_ne!(leaf, compute_leaf(&user, 1, &user, U256::from(25u64)));
        assert_ne!(leaf, compute_leaf(&token, 1, &token, U256::from(25u64)));
        assert_ne!(leaf, compute_leaf(&user, 1, &token, U256::from(26u64)));
    }

    #[test]
    fn test_hash_pair_is_order_independent() {
        let left = [1u8; 32];
        let right = [2u8; 32];
        let hash = hash_pair(&left, &right);
        assert_ne!(hash, [0u8; 32]);
        assert_eq!(hash, hash_pair(&right, &left));

        let mut concat = [0u8; 64];
        concat[..32].copy_from_slice(&left);
        concat[32..].copy_from_slice(&right);
        assert_eq!(hash, keccak256(&concat));
    }

    #[test]
    fn test_verify_merkle_proof() {
        let a = [3u8; 32];
        let b = [9u8; 32];
        let c = [5u8; 32];
        let ab = hash_pair(&a, &b);
        let root = hash_pair(&ab, &c);

        assert!(verify_merkle_proof(&a, &[b, c], &root));
        assert!(verify_merkle_proof(&b, &[a, c], &root));
        assert!(verify_merkle_proof(&c, &[ab], &root));
        assert!(!verify_merkle_proof(&c, &[a], &root));
        assert!(!verify_merkle_proof(&a, &[c, b], &root));
    }

    #[test]
    fn test_single_leaf_tree_verifies_with_empty_proof() {
        let leaf = [7u8; 32];
        assert!(verify_merkle_proof(&leaf, &[], &leaf));
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0x071c052a78cF8dBdD4F61381596ec64078d1840B".parse().unwrap();
        assert_eq!(addr.to_string(), "0x071c052a78cf8dbdd4f61381596ec64078d1840b");
        assert_eq!(
            "071c052a78cf8dbdd4f61381596ec64078d1840b".parse::<Address>().unwrap(),
            addr
        );

        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(ParseError::InvalidLength { expected: 20, actual: 2 })
        ));
        assert!(matches!(
            "0xzz1c052a78cf8dbdd4f61381596ec64078d1840b".parse::<Address>(),
            Err(ParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_parse_u256() {
        assert_eq!(
            parse_u256("25000000000000000000").unwrap(),
            U256::from(25u64) * U256::exp10(18)
        );
        assert!(matches!(parse_u256("-1"), Err(ParseError::InvalidNumber(_))));
        assert!(matches!(parse_u256("0x10"), Err(ParseError::InvalidNumber(_))));
        assert_eq!(parse_u256(""), Err(ParseError::InvalidNumber(String::new())));
        assert_eq!(parse_u256("  "), Err(ParseError::InvalidNumber("  ".to_string())));
    }
}
