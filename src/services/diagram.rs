//! Diagram storage service — save/load over Postgres storage records.
//!
//! DESIGN
//! ======
//! The durable shape is one row per diagram: the full graph serialized into a
//! jsonb `content` column plus flat metadata (`title`, `user_id`, `type`,
//! timestamps). The in-memory `DiagramState` is authoritative while an editor
//! session is open; this module handles hydration on open and the actual row
//! writes the persistence worker issues.
//!
//! ERROR HANDLING
//! ==============
//! Loads distinguish `NotFound` from database failures so routes can map them
//! to 404 vs 500. Writes only report errors; retry policy lives with the
//! persistence worker.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::graph::Diagram;
use crate::state::{AppState, DiagramState};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DiagramError {
    #[error("diagram not found: {0}")]
    NotFound(Uuid),
    #[error("stored content is not a valid diagram: {0}")]
    CorruptContent(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Flat listing entry, without the graph content.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DiagramSummary {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub diagram_type: String,
    pub thumbnail: Option<String>,
}

// =============================================================================
// SAVE / LOAD
// =============================================================================

/// Upsert the full storage record for a diagram.
///
/// # Errors
///
/// Returns a database error if the write fails.
pub async fn save_diagram(pool: &PgPool, diagram: &Diagram, user_id: Uuid) -> Result<(), DiagramError> {
    let content = serde_json::to_value(diagram)
        .map_err(|e| DiagramError::CorruptContent(e.to_string()))?;

    sqlx::query(
        "INSERT INTO diagrams (id, title, user_id, content, type, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, now(), now()) \
         ON CONFLICT (id) DO UPDATE SET \
             title = EXCLUDED.title, content = EXCLUDED.content, updated_at = now()",
    )
    .bind(diagram.id)
    .bind(&diagram.title)
    .bind(user_id)
    .bind(&content)
    .bind(diagram.diagram_type.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a diagram's graph from its storage record, scoped to its owner.
///
/// # Errors
///
/// Returns `NotFound` when no row matches, `CorruptContent` when the jsonb
/// column no longer deserializes.
pub async fn load_diagram(pool: &PgPool, diagram_id: Uuid, user_id: Uuid) -> Result<Diagram, DiagramError> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT content FROM diagrams WHERE id = $1 AND user_id = $2")
            .bind(diagram_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    let (content,) = row.ok_or(DiagramError::NotFound(diagram_id))?;
    serde_json::from_value(content).map_err(|e| DiagramError::CorruptContent(e.to_string()))
}

/// List a user's diagrams, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_diagrams(pool: &PgPool, user_id: Uuid) -> Result<Vec<DiagramSummary>, DiagramError> {
    let rows = sqlx::query_as::<_, (Uuid, String, String, Option<String>)>(
        "SELECT id, title, type, thumbnail
         FROM diagrams
         WHERE user_id = $1
         ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, title, diagram_type, thumbnail)| DiagramSummary { id, title, diagram_type, thumbnail })
        .collect())
}

/// Delete a diagram's storage record and evict any live state.
///
/// # Errors
///
/// Returns `NotFound` when the row doesn't exist or belongs to someone else.
pub async fn delete_diagram(state: &AppState, diagram_id: Uuid, user_id: Uuid) -> Result<(), DiagramError> {
    let result = sqlx::query("DELETE FROM diagrams WHERE id = $1 AND user_id = $2")
        .bind(diagram_id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DiagramError::NotFound(diagram_id));
    }

    let mut diagrams = state.diagrams.write().await;
    diagrams.remove(&diagram_id);
    info!(%diagram_id, "diagram deleted");
    Ok(())
}

// =============================================================================
// OPEN / CLOSE
// =============================================================================

/// Open an editor session: hydrate the diagram from Postgres if it isn't
/// already live, and return a snapshot of the graph.
///
/// # Errors
///
/// Returns `NotFound` when no stored diagram matches the id/owner.
pub async fn open_diagram(state: &AppState, diagram_id: Uuid, user_id: Uuid) -> Result<Diagram, DiagramError> {
    {
        let diagrams = state.diagrams.read().await;
        if let Some(ds) = diagrams.get(&diagram_id) {
            return Ok(ds.diagram.clone());
        }
    }

    // Fetch outside the lock; apply only if still absent.
    let diagram = load_diagram(&state.pool, diagram_id, user_id).await?;
    let conversation_id: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM conversations WHERE diagram_id = $1")
            .bind(diagram_id)
            .fetch_optional(&state.pool)
            .await?;

    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .entry(diagram_id)
        .or_insert_with(|| DiagramState::new(diagram, conversation_id.unwrap_or_else(Uuid::new_v4), user_id));
    info!(%diagram_id, nodes = ds.diagram.nodes.len(), "diagram hydrated");
    Ok(ds.diagram.clone())
}

/// Close an editor session: flush the latest state, then evict it from
/// memory. If the flush fails the state is retained with its dirty flag so
/// the persistence worker can retry instead of losing edits.
pub async fn close_diagram(state: &AppState, diagram_id: Uuid) {
    match super::persistence::flush_now(state, diagram_id).await {
        Ok(()) => {
            let mut diagrams = state.diagrams.write().await;
            if diagrams.get(&diagram_id).is_some_and(|ds| !ds.dirty) {
                diagrams.remove(&diagram_id);
                info!(%diagram_id, "diagram evicted from memory");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, %diagram_id, "final flush failed; diagram retained for retry");
        }
    }
}

#[cfg(test)]
#[path = "diagram_test.rs"]
mod tests;
