//! Conversation service — the requirements dialogue that precedes generation.
//!
//! DESIGN
//! ======
//! A conversation is an append-only message history plus a workflow phase.
//! While drafting, every user message gets an assistant prose reply that
//! restates the requirements as the model understood them; the phase then
//! moves to `confirming` so the user can approve generation or keep refining.
//!
//! The in-memory session is authoritative. Database writes for messages and
//! phase changes are best-effort mirrors: a failed insert is logged and the
//! session continues, because losing a chat row is recoverable while blocking
//! the dialogue on it is not.
//!
//! ERROR HANDLING
//! ==============
//! `WorkflowError` distinguishes a missing session, an action illegal in the
//! current phase, and LLM/database failures so routes can map them to 404,
//! 409, and 502/500 respectively.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::types::{ChatMessage, LlmError};
use crate::state::{
    AppState, Conversation, ConversationSession, Message, MessageStatus, Phase, Role, now_ms,
};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),
    #[error("cannot {action} while {from}")]
    InvalidTransition { from: Phase, action: &'static str },
    #[error("no LLM provider is configured")]
    LlmNotConfigured,
    #[error("generation already in progress")]
    GenerationInFlight,
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    fn invalid(from: Phase, action: &'static str) -> Self {
        Self::InvalidTransition { from, action }
    }
}

/// Snapshot returned to the client after a workflow operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    #[serde(rename = "diagramId")]
    pub diagram_id: Option<Uuid>,
    pub phase: Phase,
    pub messages: Vec<Message>,
}

fn view_of(session: &ConversationSession) -> ConversationView {
    ConversationView {
        id: session.conversation.id,
        diagram_id: session.conversation.diagram_id,
        phase: session.phase,
        messages: session.conversation.messages.clone(),
    }
}

const DRAFTING_SYSTEM_PROMPT: &str = "You are a requirements analyst helping a user describe a \
software system for a use case diagram. Restate the actors, use cases, and relationships you \
understood from the conversation so far in plain prose, then ask whether the summary is complete. \
Do not output JSON or diagram markup.";

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Create a fresh conversation in the drafting phase.
///
/// # Errors
///
/// Never fails today; kept fallible for parity with the other operations.
pub async fn create_conversation(state: &AppState, user_id: Uuid) -> Result<ConversationView, WorkflowError> {
    let conversation_id = Uuid::new_v4();
    let conversation = Conversation { id: conversation_id, diagram_id: None, messages: Vec::new() };
    let session = ConversationSession::new(conversation, user_id, Phase::Drafting);
    let view = view_of(&session);

    state.sessions.write().await.insert(conversation_id, session);
    mirror_conversation_insert(&state.pool, conversation_id, user_id).await;
    info!(%conversation_id, "conversation created");
    Ok(view)
}

/// Fetch the current view of a conversation.
///
/// # Errors
///
/// Returns `ConversationNotFound` if no session exists.
pub async fn get_conversation(state: &AppState, conversation_id: Uuid) -> Result<ConversationView, WorkflowError> {
    let sessions = state.sessions.read().await;
    let session = sessions
        .get(&conversation_id)
        .ok_or(WorkflowError::ConversationNotFound(conversation_id))?;
    Ok(view_of(session))
}

// =============================================================================
// MESSAGE SUBMISSION
// =============================================================================

/// Append a user message and produce the assistant's prose reply.
///
/// Legal while drafting or confirming; a message during confirming reopens
/// the requirements discussion. The user message is appended as `PENDING`
/// before the model call so the history never loses input; it is marked
/// `COMPLETED` together with the reply, or `FAILED` when the model call
/// fails (in which case the phase is unchanged).
///
/// # Errors
///
/// Returns `InvalidTransition` outside drafting/confirming,
/// `LlmNotConfigured` without a provider, and `Llm` when the chat call
/// fails.
pub async fn submit_message(
    state: &AppState,
    conversation_id: Uuid,
    content: &str,
) -> Result<ConversationView, WorkflowError> {
    let llm = state.llm.clone().ok_or(WorkflowError::LlmNotConfigured)?;

    // Append the user message and snapshot history under the lock.
    let (user_message_id, history) = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&conversation_id)
            .ok_or(WorkflowError::ConversationNotFound(conversation_id))?;

        if !matches!(session.phase, Phase::Drafting | Phase::Confirming) {
            return Err(WorkflowError::invalid(session.phase, "send a message"));
        }

        let message = Message {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.trim().to_owned(),
            status: MessageStatus::Pending,
            created_at: now_ms(),
        };
        let message_id = message.id;
        session.conversation.messages.push(message);
        (message_id, chat_history(&session.conversation))
    };

    // Model call happens without holding the session lock.
    let result = llm.chat(1024, DRAFTING_SYSTEM_PROMPT, &history).await;

    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&conversation_id)
        .ok_or(WorkflowError::ConversationNotFound(conversation_id))?;

    match result {
        Ok(response) => {
            set_message_status(session, user_message_id, MessageStatus::Completed);
            if let Some(user_message) =
                session.conversation.messages.iter().find(|m| m.id == user_message_id)
            {
                mirror_message_insert(&state.pool, conversation_id, user_message).await;
            }
            let reply = Message {
                id: Uuid::new_v4(),
                role: Role::Assistant,
                content: response.text,
                status: MessageStatus::Completed,
                created_at: now_ms(),
            };
            mirror_message_insert(&state.pool, conversation_id, &reply).await;
            session.conversation.messages.push(reply);
            session.phase = Phase::Confirming;
            mirror_phase_update(&state.pool, conversation_id, session.phase).await;
            Ok(view_of(session))
        }
        Err(e) => {
            warn!(error = %e, %conversation_id, "assistant reply failed");
            set_message_status(session, user_message_id, MessageStatus::Failed);
            Err(WorkflowError::Llm(e))
        }
    }
}

/// Reopen the requirements discussion instead of approving generation.
///
/// # Errors
///
/// Returns `InvalidTransition` unless the conversation is confirming.
pub async fn request_revision(state: &AppState, conversation_id: Uuid) -> Result<ConversationView, WorkflowError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&conversation_id)
        .ok_or(WorkflowError::ConversationNotFound(conversation_id))?;

    if session.phase != Phase::Confirming {
        return Err(WorkflowError::invalid(session.phase, "request revisions"));
    }
    session.phase = Phase::Drafting;
    mirror_phase_update(&state.pool, conversation_id, session.phase).await;
    Ok(view_of(session))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Completed messages as LLM chat turns, oldest first.
pub fn chat_history(conversation: &Conversation) -> Vec<ChatMessage> {
    conversation
        .messages
        .iter()
        .filter(|m| m.status != MessageStatus::Failed)
        .map(|m| match m.role {
            Role::User => ChatMessage::user(&m.content),
            Role::Assistant => ChatMessage::assistant(&m.content),
        })
        .collect()
}

fn set_message_status(session: &mut ConversationSession, message_id: Uuid, status: MessageStatus) {
    if let Some(message) = session.conversation.messages.iter_mut().find(|m| m.id == message_id) {
        message.status = status;
    }
}

// Best-effort database mirrors. The session map is authoritative; a failed
// mirror write is logged, never propagated.

async fn mirror_conversation_insert(pool: &PgPool, conversation_id: Uuid, user_id: Uuid) {
    let result = sqlx::query(
        "INSERT INTO conversations (id, user_id, phase, created_at) VALUES ($1, $2, $3, now())",
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(Phase::Drafting.as_str())
    .execute(pool)
    .await;
    if let Err(e) = result {
        warn!(error = %e, %conversation_id, "conversation insert failed");
    }
}

pub(super) async fn mirror_message_insert(pool: &PgPool, conversation_id: Uuid, message: &Message) {
    let result = sqlx::query(
        "INSERT INTO messages (id, conversation_id, role, content, status, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(message.id)
    .bind(conversation_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(message.status.as_str())
    .bind(message.created_at)
    .execute(pool)
    .await;
    if let Err(e) = result {
        warn!(error = %e, %conversation_id, "message insert failed");
    }
}

pub(super) async fn mirror_phase_update(pool: &PgPool, conversation_id: Uuid, phase: Phase) {
    let result = sqlx::query("UPDATE conversations SET phase = $1 WHERE id = $2")
        .bind(phase.as_str())
        .bind(conversation_id)
        .execute(pool)
        .await;
    if let Err(e) = result {
        warn!(error = %e, %conversation_id, "phase update failed");
    }
}

/// Write the conversation's ownership link to its diagram. Returns whether
/// the link landed; the caller keeps it queued otherwise. Only called after
/// the diagram row exists, because of the foreign key on `diagram_id`.
pub(super) async fn mirror_diagram_link(pool: &PgPool, conversation_id: Uuid, diagram_id: Uuid) -> bool {
    let result = sqlx::query("UPDATE conversations SET diagram_id = $1 WHERE id = $2")
        .bind(diagram_id)
        .bind(conversation_id)
        .execute(pool)
        .await;
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, %conversation_id, "diagram link update failed");
            false
        }
    }
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
