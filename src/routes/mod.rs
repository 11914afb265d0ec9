//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the REST API under a single Axum router: conversation
//! workflow endpoints, diagram lifecycle, and canvas editing operations. The
//! canvas frontend is a separate deployment; CORS is wide open here and
//! per-user scoping rides on the `user_id` the frontend supplies.

pub mod conversations;
pub mod diagrams;

use axum::Router;
use axum::response::Json;
use axum::routing::{delete, get, patch, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/conversations", post(conversations::create_conversation))
        .route("/api/conversations/{id}", get(conversations::get_conversation))
        .route("/api/conversations/{id}/messages", post(conversations::submit_message))
        .route("/api/conversations/{id}/revise", post(conversations::request_revision))
        .route("/api/conversations/{id}/approve", post(conversations::approve_generation))
        .route("/api/conversations/{id}/retry", post(conversations::retry_generation))
        .route("/api/diagrams", get(diagrams::list_diagrams))
        .route("/api/diagrams/{id}", delete(diagrams::delete_diagram))
        .route("/api/diagrams/{id}/open", post(diagrams::open_diagram))
        .route("/api/diagrams/{id}/close", post(diagrams::close_diagram))
        .route("/api/diagrams/{id}/flush", post(diagrams::flush_diagram))
        .route("/api/diagrams/{id}/unsaved", get(diagrams::unsaved))
        .route("/api/diagrams/{id}/nodes", post(diagrams::add_node))
        .route("/api/diagrams/{id}/nodes/{node_id}/position", patch(diagrams::move_node))
        .route("/api/diagrams/{id}/edges", post(diagrams::connect))
        .route("/api/diagrams/{id}/elements/{element_id}/label", patch(diagrams::relabel))
        .route("/api/diagrams/{id}/delete-selection", post(diagrams::delete_selection))
        .route("/api/diagrams/{id}/palette-drop", post(diagrams::palette_drop))
        .route("/api/diagrams/{id}/viewport", put(diagrams::set_viewport))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
