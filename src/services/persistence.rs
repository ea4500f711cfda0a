//! Persistence service: periodic grid snapshots with retention.
//!
//! DESIGN
//! ======
//! A background task wakes every `persist_interval`, takes a sparse snapshot
//! under the grid read lock, releases it, then writes
//! `grid_state_<UTC timestamp>.json` into the states directory and prunes
//! all but the newest `persist_retention` files. File names sort
//! lexicographically by creation time, so "newest" is "greatest name".
//!
//! At startup the greatest file is loaded once and replaces the default
//! grid through the same validation as live updates.
//!
//! ERROR HANDLING
//! ==============
//! Persistence is best-effort recovery. A failed save skips that tick, a
//! missing or unreadable snapshot leaves the default grid; neither stops
//! the server.

use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::message::GridState;
use crate::services::grid::{GridStore, ReplaceSummary};
use crate::state::AppState;

pub const STATE_FILE_PREFIX: &str = "grid_state_";
pub const STATE_FILE_SUFFIX: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestamp format error: {0}")]
    Timestamp(#[from] time::error::Format),
}

// =============================================================================
// BACKGROUND TASK
// =============================================================================

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = state.config.persist_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let dir = &state.config.states_dir;
            match persist_once(&state.grid, dir, state.config.persist_retention, OffsetDateTime::now_utc()).await {
                Ok(path) => info!(path = %path.display(), "grid state saved"),
                Err(e) => error!(error = %e, dir = %dir.display(), "grid state save failed"),
            }
        }
    })
}

/// One persistence tick: save a snapshot stamped `now`, then prune.
///
/// # Errors
///
/// Returns the save error. Prune failures are logged, not returned, since
/// the snapshot itself was written.
pub async fn persist_once(
    grid: &GridStore,
    dir: &Path,
    retention: usize,
    now: OffsetDateTime,
) -> Result<PathBuf, PersistenceError> {
    let path = save_snapshot(grid, dir, now).await?;
    if let Err(e) = prune_snapshots(dir, retention).await {
        warn!(error = %e, dir = %dir.display(), "snapshot prune failed");
    }
    Ok(path)
}

// =============================================================================
// SAVE / PRUNE
// =============================================================================

/// Write the grid's sparse snapshot to a new file named for `now`.
///
/// The file is written under a temporary name and renamed into place, so
/// the loader never sees a half-written newest snapshot. The temporary file
/// is removed again if either step fails.
///
/// # Errors
///
/// Returns an IO, serialization or timestamp formatting error.
pub async fn save_snapshot(grid: &GridStore, dir: &Path, now: OffsetDateTime) -> Result<PathBuf, PersistenceError> {
    let state = GridState { grid: grid.sparse_snapshot().await, timestamp: now.format(&Rfc3339)? };
    let json = serde_json::to_vec_pretty(&state)?;

    tokio::fs::create_dir_all(dir).await?;
    let name = snapshot_file_name(now)?;
    let path = dir.join(&name);
    let tmp = dir.join(format!(".{name}.tmp"));
    let written = match tokio::fs::write(&tmp, &json).await {
        Ok(()) => tokio::fs::rename(&tmp, &path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            warn!(error = %cleanup, file = %tmp.display(), "failed to remove temp snapshot");
        }
        return Err(e.into());
    }
    Ok(path)
}

/// Delete all but the newest `keep` snapshot files. Returns removed names.
///
/// # Errors
///
/// Returns an IO error if the directory cannot be listed. Individual
/// removal failures are logged and skipped.
pub async fn prune_snapshots(dir: &Path, keep: usize) -> Result<Vec<String>, PersistenceError> {
    let names = list_snapshots(dir).await?;
    let mut removed = Vec::new();
    for name in names.into_iter().skip(keep) {
        match tokio::fs::remove_file(dir.join(&name)).await {
            Ok(()) => {
                info!(file = %name, "removed old grid state");
                removed.push(name);
            }
            Err(e) => warn!(error = %e, file = %name, "failed to remove old grid state"),
        }
    }
    Ok(removed)
}

/// Snapshot file names in `dir`, newest first. A missing directory is empty.
///
/// # Errors
///
/// Returns an IO error for anything other than a missing directory.
pub async fn list_snapshots(dir: &Path) -> Result<Vec<String>, PersistenceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_snapshot_name(&name) {
            names.push(name);
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

// =============================================================================
// LOAD
// =============================================================================

/// Read and parse the newest snapshot, if any.
///
/// # Errors
///
/// Returns an IO error if the newest file cannot be read, or a JSON error if
/// it does not parse.
pub async fn load_latest(dir: &Path) -> Result<Option<(String, GridState)>, PersistenceError> {
    let Some(name) = list_snapshots(dir).await?.into_iter().next() else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(dir.join(&name)).await?;
    let state: GridState = serde_json::from_slice(&bytes)?;
    Ok(Some((name, state)))
}

/// Startup restore: replace the grid with the newest snapshot. Never fails;
/// on any problem the grid stays at its default.
pub async fn restore_latest(state: &AppState) -> Option<ReplaceSummary> {
    let dir = &state.config.states_dir;
    match load_latest(dir).await {
        Ok(Some((name, snapshot))) => {
            let summary = state.grid.replace_all(&snapshot.grid).await;
            info!(
                file = %name,
                applied = summary.applied,
                skipped = summary.skipped,
                "loaded grid state"
            );
            Some(summary)
        }
        Ok(None) => {
            info!(dir = %dir.display(), "no grid state found; starting blank");
            None
        }
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "failed to load grid state; starting blank");
            None
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// `grid_state_YYYY-MM-DD_HH-MM-SS-mmm.json` for `now` in UTC.
///
/// # Errors
///
/// Returns a formatting error (not expected for in-range dates).
pub fn snapshot_file_name(now: OffsetDateTime) -> Result<String, time::error::Format> {
    let stamp = now
        .to_offset(time::UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]-[subsecond digits:3]"))?;
    Ok(format!("{STATE_FILE_PREFIX}{stamp}{STATE_FILE_SUFFIX}"))
}

fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(STATE_FILE_PREFIX) && name.ends_with(STATE_FILE_SUFFIX)
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
