//! Claim requests as presented by a claimant.
//!
//! Everything coming from a JSON payload or from the parallel-array call
//! layout is turned into [`ClaimRequest`] values here, before any proof is
//! walked.

use crate::error::{LedgerError, ParseError};
use crate::{compute_leaf, parse_hash, parse_u256, Address, Hash, U256};

/// Longest proof accepted. A 64-level sorted-pair tree already covers far
/// more leaves than any season could hold.
pub const MAX_PROOF_LEN: usize = 64;

/// One `(season, token, points, proof)` tuple of a claim batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub season_id: u64,
    pub token: Address,
    pub points: U256,
    pub proof: Vec<Hash>,
}

impl ClaimRequest {
    pub fn new(season_id: u64, token: Address, points: U256, proof: Vec<Hash>) -> Self {
        Self {
            season_id,
            token,
            points,
            proof,
        }
    }

    /// Parse a tuple whose token, points and proof arrive as strings.
    pub fn from_hex(
        season_id: u64,
        token: &str,
        points: &str,
        proof: &[String],
    ) -> Result<Self, ParseError> {
        let token = token.parse()?;
        let points = parse_u256(points)?;
        let proof = proof
            .iter()
            .map(|p| parse_hash(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(season_id, token, points, proof))
    }

    /// Zip the parallel arrays of the on-chain `ClaimData` layout.
    pub fn from_parallel(
        season_ids: &[u64],
        tokens: &[Address],
        points: &[U256],
        proofs: &[Vec<Hash>],
    ) -> Result<Vec<Self>, LedgerError> {
        let n = season_ids.len();
        for len in [tokens.len(), points.len(), proofs.len()] {
            if len != n {
                return Err(LedgerError::LengthMismatch { left: n, right: len });
            }
        }
        Ok((0..n)
            .map(|i| Self::new(season_ids[i], tokens[i], points[i], proofs[i].clone()))
            .collect())
    }

    /// Shape checks that do not need ledger state.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.points.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if self.proof.len() > MAX_PROOF_LEN {
            return Err(LedgerError::ProofTooLong {
                len: self.proof.len(),
                max: MAX_PROOF_LEN,
            });
        }
        Ok(())
    }

    /// Leaf this request asserts for `claimant`.
    pub fn leaf_for(&self, claimant: &Address) -> Hash {
        compute_leaf(claimant, self.season_id, &self.token, self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let proof = vec![format!("0x{}", "ab".repeat(32))];
        let req = ClaimRequest::from_hex(
            1,
            "0x5e6CB7E728E1C320855587E1D9C6F7972ebdD6D5",
            "25000000000000000000",
            &proof,
        )
        .unwrap();
        assert_eq!(req.season_id, 1);
        assert_eq!(req.points, U256::from(25u64) * U256::exp10(18));
        assert_eq!(req.proof, vec![[0xabu8; 32]]);
    }

    #[test]
    fn test_from_hex_rejects_short_hash() {
        let proof = vec!["0xabcd".to_string()];
        let err = ClaimRequest::from_hex(1, &Address::ZERO.to_string(), "1", &proof).unwrap_err();
        assert_eq!(err, ParseError::InvalidLength { expected: 32, actual: 2 });
    }

    #[test]
    fn test_from_hex_rejects_blank_points() {
        let err = ClaimRequest::from_hex(1, &Address::ZERO.to_string(), " ", &[]).unwrap_err();
        assert_eq!(err, ParseError::InvalidNumber(" ".to_string()));
    }

    #[test]
    fn test_from_parallel_length_mismatch() {
        let err = ClaimRequest::from_parallel(
            &[1, 1],
            &[Address::ZERO, Address::ZERO],
            &[U256::one()],
            &[vec![], vec![]],
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::LengthMismatch { left: 2, right: 1 });
    }

    #[test]
    fn test_from_parallel() {
        let claims = ClaimRequest::from_parallel(
            &[1, 2],
            &[Address::repeat(1), Address::repeat(2)],
            &[U256::from(10u64), U256::from(20u64)],
            &[vec![[1u8; 32]], vec![]],
        )
        .unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1].season_id, 2);
        assert_eq!(claims[1].token, Address::repeat(2));
        assert!(claims[1].proof.is_empty());
    }

    #[test]
    fn test_validate() {
        let ok = ClaimRequest::new(1, Address::ZERO, U256::one(), vec![]);
        assert!(ok.validate().is_ok());

        let zero = ClaimRequest::new(1, Address::ZERO, U256::zero(), vec![]);
        assert_eq!(zero.validate(), Err(LedgerError::ZeroAmount));

        let long = ClaimRequest::new(1, Address::ZERO, U256::one(), vec![[0u8; 32]; MAX_PROOF_LEN + 1]);
        assert!(matches!(long.validate(), Err(LedgerError::ProofTooLong { .. })));
    }
}
