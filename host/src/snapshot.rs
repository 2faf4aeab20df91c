//! Per-season tree data file.
//!
//! ```json
//! { "root": "0x..", "seasonId": 1, "leaves": ["0x..", ...],
//!   "userProofs": { "0x<user>": { "seasonId": 1, "tokens": ["0x.."],
//!                                 "points": [25000000000000000000],
//!                                 "proofs": [["0x..", ...]] } } }
//! ```
//!
//! Points are base units and are written as plain JSON integers of any
//! width.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rewards_core::{hash_to_hex, verify_merkle_proof, Address, ClaimRequest, Hash, LedgerError, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregator::RewardFact;
use crate::merkle::{MerkleTree, TreeError};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("season {season_id} has no reward facts; refusing to publish an empty tree")]
    Empty { season_id: u64 },

    #[error("fact for season {found} in a snapshot for season {expected}")]
    MixedSeasons { expected: u64, found: u64 },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tree data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("root mismatch: file says {expected}, leaves give {computed}")]
    RootMismatch { expected: String, computed: String },

    #[error("proof {index} of {address} does not verify against the root")]
    InvalidProof { address: Address, index: usize },

    #[error("{0} has no rewards in this snapshot")]
    UnknownUser(Address),

    #[error("inconsistent entry for {address}: {source}")]
    Inconsistent {
        address: Address,
        #[source]
        source: LedgerError,
    },
}

/// Everything one user needs to claim a season's rewards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProofs {
    pub season_id: u64,
    pub tokens: Vec<Address>,
    #[serde(with = "json_points")]
    pub points: Vec<U256>,
    #[serde(with = "hex_proofs")]
    pub proofs: Vec<Vec<Hash>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    #[serde(with = "hex_hash")]
    pub root: Hash,
    pub season_id: u64,
    #[serde(with = "hex_hashes")]
    pub leaves: Vec<Hash>,
    pub user_proofs: BTreeMap<Address, UserProofs>,
}

impl TreeSnapshot {
    /// Build the tree for one season and collect every user's proofs.
    pub fn build(season_id: u64, facts: &[RewardFact]) -> Result<Self, SnapshotError> {
        if facts.is_empty() {
            return Err(SnapshotError::Empty { season_id });
        }
        if let Some(fact) = facts.iter().find(|f| f.season_id != season_id) {
            return Err(SnapshotError::MixedSeasons {
                expected: season_id,
                found: fact.season_id,
            });
        }

        let leaves: Vec<Hash> = facts.iter().map(RewardFact::leaf).collect();
        let tree = MerkleTree::new(&leaves)?;

        let mut user_proofs: BTreeMap<Address, UserProofs> = BTreeMap::new();
        for (fact, leaf) in facts.iter().zip(&leaves) {
            let proof = tree.proof_for(leaf)?;
            debug!(address = %fact.address, token = %fact.token, points = %fact.points, leaf = %hash_to_hex(leaf), "leaf");
            let entry = user_proofs.entry(fact.address).or_insert_with(|| UserProofs {
                season_id,
                tokens: Vec::new(),
                points: Vec::new(),
                proofs: Vec::new(),
            });
            entry.tokens.push(fact.token);
            entry.points.push(fact.points);
            entry.proofs.push(proof);
        }

        info!(
            season_id,
            leaves = tree.len(),
            users = user_proofs.len(),
            root = %hash_to_hex(&tree.root()),
            "built merkle tree"
        );
        Ok(Self {
            root: tree.root(),
            season_id,
            leaves: tree.leaves().to_vec(),
            user_proofs,
        })
    }

    pub fn file_name(season_id: u64) -> String {
        format!("merkle-tree-data-season-{season_id}.json")
    }

    /// Write `merkle-tree-data-season-<id>.json` into `dir`. The file appears
    /// complete or not at all.
    pub fn write_atomic(&self, dir: &Path) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
        let path = dir.join(Self::file_name(self.season_id));
        let tmp = dir.join(format!(".{}.tmp", Self::file_name(self.season_id)));

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json).map_err(io_error(&tmp))?;
        if let Err(source) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(SnapshotError::Io { path, source });
        }

        info!(path = %path.display(), "tree data saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = fs::read_to_string(path).map_err(io_error(path))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Claim tuples for `address`, ready for the ledger.
    pub fn claims_for(&self, address: &Address) -> Result<Vec<ClaimRequest>, SnapshotError> {
        let entry = self
            .user_proofs
            .get(address)
            .ok_or(SnapshotError::UnknownUser(*address))?;
        let seasons = vec![entry.season_id; entry.tokens.len()];
        ClaimRequest::from_parallel(&seasons, &entry.tokens, &entry.points, &entry.proofs)
            .map_err(|source| SnapshotError::Inconsistent {
                address: *address,
                source,
            })
    }

    /// Rebuild the tree from `leaves` and check the root and every proof.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        let tree = MerkleTree::new(&self.leaves)?;
        if tree.root() != self.root {
            return Err(SnapshotError::RootMismatch {
                expected: hash_to_hex(&self.root),
                computed: hash_to_hex(&tree.root()),
            });
        }

        for address in self.user_proofs.keys() {
            for (index, claim) in self.claims_for(address)?.iter().enumerate() {
                let leaf = claim.leaf_for(address);
                if tree.index_of(&leaf).is_none()
                    || !verify_merkle_proof(&leaf, &claim.proof, &self.root)
                {
                    return Err(SnapshotError::InvalidProof {
                        address: *address,
                        index,
                    });
                }
            }
        }
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError {
    let path = path.to_path_buf();
    move |source| SnapshotError::Io { path, source }
}

mod hex_hash {
    use rewards_core::{hash_to_hex, parse_hash, Hash};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash_to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_hash(&s).map_err(D::Error::custom)
    }
}

mod hex_hashes {
    use rewards_core::{hash_to_hex, parse_hash, Hash};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(hashes: &Vec<Hash>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(hashes.iter().map(hash_to_hex))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| parse_hash(s).map_err(D::Error::custom))
            .collect()
    }
}

mod hex_proofs {
    use rewards_core::{hash_to_hex, parse_hash, Hash};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(
        proofs: &Vec<Vec<Hash>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            proofs
                .iter()
                .map(|proof| proof.iter().map(hash_to_hex).collect::<Vec<_>>()),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<Hash>>, D::Error> {
        let raw = Vec::<Vec<String>>::deserialize(deserializer)?;
        raw.iter()
            .map(|proof| {
                proof
                    .iter()
                    .map(|s| parse_hash(s).map_err(D::Error::custom))
                    .collect()
            })
            .collect()
    }
}

/// Base-unit amounts as bare JSON integers (needs serde_json's
/// `arbitrary_precision` for values above u64).
mod json_points {
    use rewards_core::{parse_u256, U256};
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Number;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(points: &Vec<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        let numbers = points
            .iter()
            .map(|p| p.to_string().parse::<Number>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(S::Error::custom)?;
        numbers.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<U256>, D::Error> {
        let numbers = Vec::<Number>::deserialize(deserializer)?;
        numbers
            .iter()
            .map(|n| parse_u256(&n.to_string()).map_err(D::Error::custom))
            .collect()
    }
}
