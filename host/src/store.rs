//! Quest-progress store adapters.
//!
//! The store itself (user documents, quest submissions) lives elsewhere;
//! this module only reads its export and yields raw reward events.

use std::path::{Path, PathBuf};

use rewards_core::{Address, ParseError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::aggregator::RawRewardEvent;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed progress export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user {address:?} has an invalid address: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: ParseError,
    },

    #[error("user {address} has a malformed token reward: {source}")]
    MalformedReward {
        address: Address,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of raw quest-completion rewards.
pub trait QuestProgressStore {
    fn completion_events(&self, season_id: u64) -> Result<Vec<RawRewardEvent>, StoreError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserProgressDoc {
    address: String,
    #[serde(default)]
    token_rewards: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRewardDoc {
    points: u64,
    season_id: u64,
    token_id: u32,
}

/// Reads the user-progress export: a JSON array of user documents, each
/// with a `tokenRewards` array of `{points, seasonId, tokenId}`.
#[derive(Debug)]
pub struct JsonProgressStore {
    users: Vec<UserProgressDoc>,
}

impl JsonProgressStore {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let users: Vec<UserProgressDoc> = serde_json::from_str(content)?;
        debug!(users = users.len(), "loaded progress export");
        Ok(Self { users })
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl QuestProgressStore for JsonProgressStore {
    fn completion_events(&self, season_id: u64) -> Result<Vec<RawRewardEvent>, StoreError> {
        let mut events = Vec::new();
        for user in &self.users {
            let address: Address =
                user.address
                    .parse()
                    .map_err(|source| StoreError::InvalidAddress {
                        address: user.address.clone(),
                        source,
                    })?;

            let Some(serde_json::Value::Array(rewards)) = &user.token_rewards else {
                warn!(%address, "user has invalid tokenRewards data, skipping");
                continue;
            };

            for reward in rewards {
                let doc: TokenRewardDoc = serde_json::from_value(reward.clone())
                    .map_err(|source| StoreError::MalformedReward { address, source })?;
                if doc.season_id != season_id {
                    continue;
                }
                events.push(RawRewardEvent {
                    address,
                    season_id: doc.season_id,
                    token_id: doc.token_id,
                    points: doc.points,
                });
            }
        }
        Ok(events)
    }
}

/// Store over events already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressStore {
    events: Vec<RawRewardEvent>,
}

impl MemoryProgressStore {
    pub fn new(events: Vec<RawRewardEvent>) -> Self {
        Self { events }
    }
}

impl QuestProgressStore for MemoryProgressStore {
    fn completion_events(&self, season_id: u64) -> Result<Vec<RawRewardEvent>, StoreError> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.season_id == season_id)
            .cloned()
            .collect())
    }
}
