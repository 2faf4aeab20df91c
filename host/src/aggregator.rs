//! Reward aggregation: raw quest-completion events to one reward fact per
//! (user, season, token).
//!
//! This is the single place where whole quest points become token base
//! units. Everything downstream (leaves, snapshot files, the ledger) works
//! in base units only.

use std::collections::BTreeMap;

use rewards_core::{compute_leaf, Address, Hash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::registry::TokenRegistry;

/// One completed-quest reward as exported by the quest-progress store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRewardEvent {
    pub address: Address,
    pub season_id: u64,
    pub token_id: u32,
    /// Whole quest points
    pub points: u64,
}

/// Cumulative reward of one user in one season for one token, in token
/// base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardFact {
    pub address: Address,
    pub season_id: u64,
    pub token: Address,
    pub points: U256,
}

impl RewardFact {
    pub fn leaf(&self) -> Hash {
        compute_leaf(&self.address, self.season_id, &self.token, self.points)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("token id {token_id} is not in the token registry")]
    UnknownToken { token_id: u32 },

    #[error("points overflow for {address} in season {season_id} ({token})")]
    Overflow {
        address: Address,
        season_id: u64,
        token: Address,
    },
}

/// Sum raw events into reward facts.
///
/// The output is sorted by (address, season, token) and does not depend on
/// the order of `events`. Totals of zero produce no fact.
pub fn aggregate<R: TokenRegistry + ?Sized>(
    events: &[RawRewardEvent],
    registry: &R,
) -> Result<Vec<RewardFact>, AggregateError> {
    let mut totals: BTreeMap<(Address, u64, Address), U256> = BTreeMap::new();

    for event in events {
        let info = registry
            .resolve(event.token_id)
            .ok_or(AggregateError::UnknownToken {
                token_id: event.token_id,
            })?;
        let overflow = || AggregateError::Overflow {
            address: event.address,
            season_id: event.season_id,
            token: info.address,
        };

        let amount = U256::from(event.points)
            .checked_mul(info.unit())
            .ok_or_else(overflow)?;
        let total = totals
            .entry((event.address, event.season_id, info.address))
            .or_default();
        *total = total.checked_add(amount).ok_or_else(overflow)?;
    }

    let facts: Vec<RewardFact> = totals
        .into_iter()
        .filter(|(_, points)| !points.is_zero())
        .map(|((address, season_id, token), points)| RewardFact {
            address,
            season_id,
            token,
            points,
        })
        .collect();
    debug!(events = events.len(), facts = facts.len(), "aggregated reward events");
    Ok(facts)
}

/// Aggregate only the events belonging to `season_id`.
pub fn aggregate_season<R: TokenRegistry + ?Sized>(
    season_id: u64,
    events: &[RawRewardEvent],
    registry: &R,
) -> Result<Vec<RewardFact>, AggregateError> {
    let season_events: Vec<RawRewardEvent> = events
        .iter()
        .filter(|e| e.season_id == season_id)
        .cloned()
        .collect();
    aggregate(&season_events, registry)
}
