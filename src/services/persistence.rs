//! Persistence worker — debounced background saves of edited diagrams.
//!
//! DESIGN
//! ======
//! Edits never write to Postgres directly. They bump a per-diagram revision
//! and set a dirty flag; a single background task wakes on a debounce
//! interval, snapshots every dirty diagram under the lock, and writes the
//! snapshots lock-free. Because there is exactly one worker, writes for a
//! diagram are single-flight by construction, and edits arriving during a
//! write simply leave the flag set for the next tick rather than being
//! dropped.
//!
//! The dirty flag is cleared only when the flushed revision is still
//! current. An edit that lands mid-write bumps the revision, the ack
//! mismatches, and the newer state goes out on the following tick.
//!
//! On-demand flushes share the same single-flight discipline: a per-diagram
//! `flushing` flag is set when a snapshot is taken and cleared by its ack.
//! `flush_now` waits for an in-flight write to settle instead of racing it,
//! so an older snapshot can never land in the store after a newer one.
//!
//! ERROR HANDLING
//! ==============
//! A failed write is retried with linear backoff; exhausting the retries
//! sets `save_failed` (surfaced as the unsaved-changes indicator) and leaves
//! the diagram dirty so the next tick tries again. Nothing is ever
//! force-cleared on failure.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::graph::Diagram;
use crate::state::{AppState, env_parse};

use super::conversation::mirror_diagram_link;
use super::diagram::{DiagramError, save_diagram};

// =============================================================================
// CONFIG
// =============================================================================

/// Tunables for the save loop, read once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SaveConfig {
    /// Quiet period between flush passes.
    pub debounce_ms: u64,
    /// Write attempts per diagram per pass.
    pub retries: u32,
    /// Backoff unit; attempt `n` sleeps `n * retry_base_ms` before retrying.
    pub retry_base_ms: u64,
}

impl SaveConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            debounce_ms: env_parse("SAVE_DEBOUNCE_MS", 2000),
            retries: env_parse("SAVE_RETRIES", 3),
            retry_base_ms: env_parse("SAVE_RETRY_BASE_MS", 250),
        }
    }
}

/// A dirty diagram captured under the lock, written outside it.
pub struct DirtySnapshot {
    pub diagram_id: Uuid,
    pub user_id: Uuid,
    pub diagram: Diagram,
    pub revision: u64,
}

// =============================================================================
// WORKER
// =============================================================================

/// Spawn the background save loop. Runs for the life of the process.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    let config = SaveConfig::from_env();
    info!(debounce_ms = config.debounce_ms, retries = config.retries, "persistence task started");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(config.debounce_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            flush_pass(&state, config).await;
        }
    })
}

async fn flush_pass(state: &AppState, config: SaveConfig) {
    for snapshot in collect_dirty(state).await {
        let diagram_id = snapshot.diagram_id;
        match write_with_retry(state, &snapshot, config).await {
            Ok(()) => ack_flushed(state, diagram_id, snapshot.revision, true).await,
            Err(e) => {
                error!(error = %e, %diagram_id, "diagram save failed after retries");
                ack_flushed(state, diagram_id, snapshot.revision, false).await;
            }
        }
    }
}

/// Snapshot every dirty diagram and mark it in flight. Consecutive edits
/// since the last pass coalesce into the single snapshot taken here; a
/// diagram whose previous write has not acked yet is skipped until it does.
pub async fn collect_dirty(state: &AppState) -> Vec<DirtySnapshot> {
    let mut diagrams = state.diagrams.write().await;
    diagrams
        .iter_mut()
        .filter(|(_, ds)| ds.dirty && !ds.flushing)
        .map(|(id, ds)| {
            ds.flushing = true;
            DirtySnapshot {
                diagram_id: *id,
                user_id: ds.user_id,
                diagram: ds.diagram.clone(),
                revision: ds.revision,
            }
        })
        .collect()
}

/// Record the outcome of a flush and release the in-flight slot. The dirty
/// flag clears only when the flushed revision is still the current one. A
/// successful ack also writes any queued conversation ownership link, now
/// that the diagram row its foreign key points at exists.
pub async fn ack_flushed(state: &AppState, diagram_id: Uuid, revision: u64, success: bool) {
    let mut diagrams = state.diagrams.write().await;
    let Some(ds) = diagrams.get_mut(&diagram_id) else {
        return;
    };
    ds.flushing = false;
    if success {
        ds.save_failed = false;
        if ds.revision == revision {
            ds.dirty = false;
        } else {
            debug!(%diagram_id, "edits arrived mid-flush; diagram stays dirty");
        }
        if let Some(conversation_id) = ds.pending_link {
            if mirror_diagram_link(&state.pool, conversation_id, diagram_id).await {
                ds.pending_link = None;
            }
        }
    } else {
        ds.save_failed = true;
    }
}

async fn write_with_retry(
    state: &AppState,
    snapshot: &DirtySnapshot,
    config: SaveConfig,
) -> Result<(), DiagramError> {
    let mut attempt = 0u32;
    loop {
        match save_diagram(&state.pool, &snapshot.diagram, snapshot.user_id).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= config.retries {
                    return Err(e);
                }
                debug!(error = %e, diagram_id = %snapshot.diagram_id, attempt, "save retry");
                tokio::time::sleep(Duration::from_millis(u64::from(attempt) * config.retry_base_ms)).await;
            }
        }
    }
}

// =============================================================================
// ON-DEMAND FLUSH
// =============================================================================

/// Flush one diagram immediately, bypassing the debounce. A clean diagram is
/// a no-op. If the background worker already has a write in flight for this
/// diagram, the flush waits for that write to settle and re-evaluates, so two
/// writes for one diagram are never outstanding at once.
///
/// # Errors
///
/// Returns the storage error when the write fails after retries; the diagram
/// stays dirty with `save_failed` set.
pub async fn flush_now(state: &AppState, diagram_id: Uuid) -> Result<(), DiagramError> {
    let snapshot = loop {
        {
            let mut diagrams = state.diagrams.write().await;
            match diagrams.get_mut(&diagram_id) {
                None => return Ok(()),
                Some(ds) if ds.flushing => {
                    // A write is in flight; wait for its ack.
                }
                Some(ds) if !ds.dirty => return Ok(()),
                Some(ds) => {
                    ds.flushing = true;
                    break DirtySnapshot {
                        diagram_id,
                        user_id: ds.user_id,
                        diagram: ds.diagram.clone(),
                        revision: ds.revision,
                    };
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    let config = SaveConfig::from_env();
    match write_with_retry(state, &snapshot, config).await {
        Ok(()) => {
            ack_flushed(state, diagram_id, snapshot.revision, true).await;
            Ok(())
        }
        Err(e) => {
            ack_flushed(state, diagram_id, snapshot.revision, false).await;
            Err(e)
        }
    }
}

/// Whether a diagram has changes not yet safely in storage. `None` when the
/// diagram isn't loaded.
pub async fn unsaved(state: &AppState, diagram_id: Uuid) -> Option<bool> {
    let diagrams = state.diagrams.read().await;
    diagrams.get(&diagram_id).map(|ds| ds.dirty || ds.save_failed)
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
