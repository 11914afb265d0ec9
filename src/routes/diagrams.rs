//! Diagram lifecycle and canvas editing routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::graph::{Diagram, Edge, Node, NodeKind, Position, Viewport};
use crate::services::diagram::{self, DiagramError, DiagramSummary};
use crate::services::editor::{self, ConnectRequest, DeleteSummary, DropOutcome, EditError};
use crate::services::persistence;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct AddNodeBody {
    pub kind: NodeKind,
    pub position: Position,
    #[serde(default)]
    pub label: String,
}

#[derive(Deserialize)]
pub struct MoveNodeBody {
    pub position: Position,
}

#[derive(Deserialize)]
pub struct RelabelBody {
    pub text: String,
}

#[derive(Deserialize)]
pub struct DeleteSelectionBody {
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub edge_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct PaletteDropBody {
    pub type_tag: String,
    pub position: Position,
    #[serde(default)]
    pub initial_data: serde_json::Value,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// `GET /api/diagrams` — list the user's diagrams.
pub async fn list_diagrams(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<DiagramSummary>>, StatusCode> {
    let summaries = diagram::list_diagrams(&state.pool, query.user_id)
        .await
        .map_err(diagram_error_to_status)?;
    Ok(Json(summaries))
}

/// `POST /api/diagrams/:id/open` — hydrate a diagram for editing.
pub async fn open_diagram(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Diagram>, StatusCode> {
    let diagram = diagram::open_diagram(&state, diagram_id, query.user_id)
        .await
        .map_err(diagram_error_to_status)?;
    Ok(Json(diagram))
}

/// `POST /api/diagrams/:id/close` — flush and evict a diagram.
pub async fn close_diagram(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
) -> Json<serde_json::Value> {
    diagram::close_diagram(&state, diagram_id).await;
    Json(serde_json::json!({ "ok": true }))
}

/// `DELETE /api/diagrams/:id` — delete a diagram.
pub async fn delete_diagram(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    diagram::delete_diagram(&state, diagram_id, query.user_id)
        .await
        .map_err(diagram_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /api/diagrams/:id/flush` — force an immediate save.
pub async fn flush_diagram(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    persistence::flush_now(&state, diagram_id)
        .await
        .map_err(diagram_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /api/diagrams/:id/unsaved` — unsaved-changes indicator.
pub async fn unsaved(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let unsaved = persistence::unsaved(&state, diagram_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!({ "unsaved": unsaved })))
}

// =============================================================================
// EDITING
// =============================================================================

/// `POST /api/diagrams/:id/nodes` — place a node.
pub async fn add_node(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Json(body): Json<AddNodeBody>,
) -> Result<Json<Node>, StatusCode> {
    let node = editor::add_node(&state, diagram_id, body.kind, body.position, &body.label)
        .await
        .map_err(edit_error_to_status)?;
    Ok(Json(node))
}

/// `PATCH /api/diagrams/:id/nodes/:node_id/position` — move a node.
pub async fn move_node(
    State(state): State<AppState>,
    Path((diagram_id, node_id)): Path<(Uuid, String)>,
    Json(body): Json<MoveNodeBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let moved = editor::move_node(&state, diagram_id, &node_id, body.position)
        .await
        .map_err(edit_error_to_status)?;
    Ok(Json(serde_json::json!({ "moved": moved })))
}

/// `POST /api/diagrams/:id/edges` — connect two node handles.
pub async fn connect(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<Edge>, StatusCode> {
    let edge = editor::connect(&state, diagram_id, body)
        .await
        .map_err(edit_error_to_status)?;
    Ok(Json(edge))
}

/// `PATCH /api/diagrams/:id/elements/:element_id/label` — commit a label edit.
pub async fn relabel(
    State(state): State<AppState>,
    Path((diagram_id, element_id)): Path<(Uuid, String)>,
    Json(body): Json<RelabelBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let committed = editor::relabel(&state, diagram_id, &element_id, &body.text)
        .await
        .map_err(edit_error_to_status)?;
    Ok(Json(serde_json::json!({ "label": committed })))
}

/// `POST /api/diagrams/:id/delete-selection` — delete nodes and edges.
pub async fn delete_selection(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Json(body): Json<DeleteSelectionBody>,
) -> Result<Json<DeleteSummary>, StatusCode> {
    let summary = editor::delete_selection(&state, diagram_id, &body.node_ids, &body.edge_ids)
        .await
        .map_err(edit_error_to_status)?;
    Ok(Json(summary))
}

/// `POST /api/diagrams/:id/palette-drop` — interpret a palette drag-and-drop.
pub async fn palette_drop(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Json(body): Json<PaletteDropBody>,
) -> Result<Json<DropOutcome>, StatusCode> {
    let outcome =
        editor::apply_palette_drop(&state, diagram_id, &body.type_tag, body.position, &body.initial_data)
            .await
            .map_err(edit_error_to_status)?;
    Ok(Json(outcome))
}

/// `PUT /api/diagrams/:id/viewport` — persist the canvas camera.
pub async fn set_viewport(
    State(state): State<AppState>,
    Path(diagram_id): Path<Uuid>,
    Json(viewport): Json<Viewport>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    editor::set_viewport(&state, diagram_id, viewport)
        .await
        .map_err(edit_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

pub(crate) fn diagram_error_to_status(err: DiagramError) -> StatusCode {
    match err {
        DiagramError::NotFound(_) => StatusCode::NOT_FOUND,
        DiagramError::CorruptContent(_) | DiagramError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn edit_error_to_status(err: EditError) -> StatusCode {
    match err {
        EditError::DiagramNotLoaded(_) => StatusCode::NOT_FOUND,
        EditError::UnknownNode(_) | EditError::InvalidHandle { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EditError::UnknownPaletteTag(_) => StatusCode::BAD_REQUEST,
    }
}
