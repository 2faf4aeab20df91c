//! One generation run: progress store -> facts -> tree -> tree data file.
//!
//! A run either writes a complete, self-verified snapshot or nothing. On any
//! failure rerun it from the start.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::aggregator::{aggregate, AggregateError};
use crate::registry::TokenRegistry;
use crate::snapshot::{SnapshotError, TreeSnapshot};
use crate::store::{QuestProgressStore, StoreError};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Build, verify and write the tree data file for `season_id`.
pub fn generate_season<S, R>(
    store: &S,
    registry: &R,
    season_id: u64,
    out_dir: &Path,
) -> Result<(TreeSnapshot, PathBuf), GenerateError>
where
    S: QuestProgressStore + ?Sized,
    R: TokenRegistry + ?Sized,
{
    info!(season_id, "generating merkle tree");
    let events = store.completion_events(season_id)?;
    let facts = aggregate(&events, registry)?;
    info!(season_id, events = events.len(), facts = facts.len(), "aggregated rewards");

    let snapshot = TreeSnapshot::build(season_id, &facts)?;
    snapshot.verify()?;
    let path = snapshot.write_atomic(out_dir)?;
    Ok((snapshot, path))
}
