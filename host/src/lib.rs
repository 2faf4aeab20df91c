//! Off-chain side of season reward distribution: aggregate quest rewards,
//! build the season's Merkle tree and publish the tree data file users claim
//! from.

pub mod aggregator;
pub mod config;
pub mod generate;
pub mod merkle;
pub mod registry;
pub mod snapshot;
pub mod store;

pub use aggregator::{aggregate, aggregate_season, RawRewardEvent, RewardFact};
pub use config::RewardsConfig;
pub use generate::{generate_season, GenerateError};
pub use merkle::{MerkleTree, TreeError};
pub use registry::{StaticTokenRegistry, TokenInfo, TokenRegistry};
pub use snapshot::{TreeSnapshot, UserProofs};
pub use store::{JsonProgressStore, MemoryProgressStore, QuestProgressStore};
