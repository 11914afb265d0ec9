//! Conversation and generation workflow routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::conversation::{self, ConversationView, WorkflowError};
use crate::services::generation::{self, GenerationOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateConversationBody {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct MessageBody {
    pub content: String,
}

/// `POST /api/conversations` — start a requirements conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> Result<Json<ConversationView>, StatusCode> {
    let view = conversation::create_conversation(&state, body.user_id)
        .await
        .map_err(workflow_error_to_status)?;
    Ok(Json(view))
}

/// `GET /api/conversations/:id` — current history and phase.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationView>, StatusCode> {
    let view = conversation::get_conversation(&state, conversation_id)
        .await
        .map_err(workflow_error_to_status)?;
    Ok(Json(view))
}

/// `POST /api/conversations/:id/messages` — send a requirements message.
pub async fn submit_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<MessageBody>,
) -> Result<Json<ConversationView>, StatusCode> {
    if body.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let view = conversation::submit_message(&state, conversation_id, &body.content)
        .await
        .map_err(workflow_error_to_status)?;
    Ok(Json(view))
}

/// `POST /api/conversations/:id/revise` — reopen the requirements discussion.
pub async fn request_revision(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationView>, StatusCode> {
    let view = conversation::request_revision(&state, conversation_id)
        .await
        .map_err(workflow_error_to_status)?;
    Ok(Json(view))
}

/// `POST /api/conversations/:id/approve` — approve and generate a diagram.
pub async fn approve_generation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<GenerationOutcome>, StatusCode> {
    let outcome = generation::approve_and_generate(&state, conversation_id)
        .await
        .map_err(workflow_error_to_status)?;
    Ok(Json(outcome))
}

/// `POST /api/conversations/:id/retry` — retry a failed generation.
pub async fn retry_generation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<GenerationOutcome>, StatusCode> {
    let outcome = generation::retry_generation(&state, conversation_id)
        .await
        .map_err(workflow_error_to_status)?;
    Ok(Json(outcome))
}

pub(crate) fn workflow_error_to_status(err: WorkflowError) -> StatusCode {
    match err {
        WorkflowError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. } | WorkflowError::GenerationInFlight => {
            StatusCode::CONFLICT
        }
        WorkflowError::LlmNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::Llm(_) => StatusCode::BAD_GATEWAY,
        WorkflowError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
