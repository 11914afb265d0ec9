//! Generation service — turns an approved conversation into a diagram.
//!
//! DESIGN
//! ======
//! Approval moves the conversation to `generating`, snapshots the message
//! history, and bumps the session's generation sequence number. The model
//! call runs without any lock held; when it settles, the result is applied
//! only if that sequence number is still current and the session still sits
//! in `generating`. Anything else means the world moved on (a retry was
//! issued, the session was reset) and the result is discarded wholesale.
//!
//! A returned payload is parsed and checked against the graph invariants
//! before it replaces anything: a malformed or invalid payload moves the
//! conversation to `failed` and leaves any existing diagram exactly as it
//! was. Regeneration over an existing diagram keeps the diagram id stable so
//! open editor references survive.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::graph::{self, Diagram, DiagramType, Edge, Node, Viewport};
use crate::llm::LlmChat;
use crate::state::{
    AppState, DiagramState, Message, MessageStatus, Phase, Role, env_parse, now_ms,
};

use super::conversation::{WorkflowError, chat_history, mirror_message_insert, mirror_phase_update};

// =============================================================================
// TYPES
// =============================================================================

/// The JSON contract the model must return. Node and edge shapes are the
/// same camelCase wire forms the editor speaks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedPayload {
    #[serde(default)]
    title: Option<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(default)]
    viewport: Option<Viewport>,
}

/// Outcome reported to the client once a generation settles.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum GenerationOutcome {
    /// The payload was accepted and the diagram is ready for editing.
    Completed { diagram_id: Uuid, phase: Phase },
    /// The payload was rejected or the model call failed.
    Failed { phase: Phase, reason: String },
    /// The session changed while the model call was in flight; the result
    /// was discarded without touching any state.
    Discarded,
}

const GENERATION_SYSTEM_PROMPT: &str = "You convert confirmed requirements into a use case \
diagram. Respond with a single JSON object and nothing else, shaped as:\n\
{\"title\": string, \"nodes\": [{\"id\": string, \"kind\": \"actor\"|\"usecase\"|\"system\", \
\"label\": string, \"position\": {\"x\": number, \"y\": number}}], \
\"edges\": [{\"id\": string, \"kind\": \"association\"|\"dependency\", \
\"sourceNodeId\": string, \"sourceHandleId\": string, \"targetNodeId\": string, \
\"targetHandleId\": string, \"dependencyKind\": \"include\"|\"extend\"}]}\n\
Handle ids are \"<side>-<direction>\" where side is top|right|bottom|left and direction is \
source|target; system nodes only have left and right handles. Every id must be unique, every \
edge must reference existing node ids and valid handles, and every label must be non-empty. \
Place actors on the left, use cases inside a system boundary on the right, and space nodes at \
least 150 pixels apart.";

// =============================================================================
// APPROVE / RETRY
// =============================================================================

/// Approve the confirmed requirements and generate a diagram.
///
/// # Errors
///
/// Returns `InvalidTransition` unless the conversation is confirming,
/// `GenerationInFlight` when a generation is already running, and
/// `LlmNotConfigured` without a provider.
pub async fn approve_and_generate(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<GenerationOutcome, WorkflowError> {
    run_generation(state, conversation_id, Phase::Confirming, "approve generation").await
}

/// Retry generation after a failure, reusing the confirmed history.
///
/// # Errors
///
/// Returns `InvalidTransition` unless the conversation is failed.
pub async fn retry_generation(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<GenerationOutcome, WorkflowError> {
    run_generation(state, conversation_id, Phase::Failed, "retry generation").await
}

async fn run_generation(
    state: &AppState,
    conversation_id: Uuid,
    expected_phase: Phase,
    action: &'static str,
) -> Result<GenerationOutcome, WorkflowError> {
    let llm: Arc<dyn LlmChat> = state.llm.clone().ok_or(WorkflowError::LlmNotConfigured)?;
    let max_tokens: u32 = env_parse("GEN_MAX_TOKENS", 8192);

    // Transition to generating and snapshot everything the model call needs.
    let (seq, history, existing_diagram_id, user_id) = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&conversation_id)
            .ok_or(WorkflowError::ConversationNotFound(conversation_id))?;

        if session.generating {
            return Err(WorkflowError::GenerationInFlight);
        }
        if session.phase != expected_phase {
            return Err(WorkflowError::InvalidTransition { from: session.phase, action });
        }

        session.phase = Phase::Generating;
        session.generating = true;
        session.generation_seq += 1;
        (
            session.generation_seq,
            chat_history(&session.conversation),
            session.conversation.diagram_id,
            session.user_id,
        )
    };
    mirror_phase_update(&state.pool, conversation_id, Phase::Generating).await;

    // Model call with no lock held.
    let result = llm.chat(max_tokens, GENERATION_SYSTEM_PROMPT, &history).await;

    let accepted = match result {
        Ok(response) => parse_payload(&response.text)
            .map_err(|reason| format!("{reason} You can retry generation.")),
        Err(e) => {
            warn!(error = %e, %conversation_id, "generation model call failed");
            let hint = if e.retryable() {
                "This is usually transient; you can retry generation."
            } else {
                "Check the model provider configuration before retrying."
            };
            Err(format!("The model call failed: {e}. {hint}"))
        }
    };

    apply_generation(state, conversation_id, seq, existing_diagram_id, user_id, accepted).await
}

// =============================================================================
// RESULT APPLICATION
// =============================================================================

async fn apply_generation(
    state: &AppState,
    conversation_id: Uuid,
    seq: u64,
    existing_diagram_id: Option<Uuid>,
    user_id: Uuid,
    accepted: Result<GeneratedPayload, String>,
) -> Result<GenerationOutcome, WorkflowError> {
    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get_mut(&conversation_id) else {
        info!(%conversation_id, "generation result dropped: session gone");
        return Ok(GenerationOutcome::Discarded);
    };

    // Stale guard: only the generation that owns the current sequence number
    // while the session still waits in `generating` may apply its result.
    if session.generation_seq != seq || session.phase != Phase::Generating {
        info!(%conversation_id, seq, "generation result discarded as stale");
        if session.generation_seq == seq {
            session.generating = false;
        }
        return Ok(GenerationOutcome::Discarded);
    }
    session.generating = false;

    match accepted {
        Ok(payload) => {
            let diagram_id = existing_diagram_id.unwrap_or_else(Uuid::new_v4);
            let title = payload
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("Use Case Diagram")
                .to_owned();
            let mut diagram = Diagram::new(diagram_id, title, DiagramType::UseCase);
            diagram.nodes = payload.nodes;
            diagram.edges = payload.edges;
            if let Some(viewport) = payload.viewport {
                diagram.viewport = viewport;
            }

            {
                let mut diagrams = state.diagrams.write().await;
                let ds = diagrams
                    .entry(diagram_id)
                    .or_insert_with(|| DiagramState::new(diagram.clone(), conversation_id, user_id));
                ds.diagram = diagram;
                ds.mark_dirty();
                // The conversations row can only reference the diagram once
                // its row exists; the ack of a successful save writes the
                // link and keeps it queued until then.
                ds.pending_link = Some(conversation_id);
            }

            session.conversation.diagram_id = Some(diagram_id);
            session.phase = Phase::Editing;
            let summary = push_assistant_message(
                session,
                "Your diagram is ready. You can now edit it on the canvas.",
                MessageStatus::Completed,
            );
            mirror_message_insert(&state.pool, conversation_id, &summary).await;
            mirror_phase_update(&state.pool, conversation_id, Phase::Editing).await;

            // Persist the new diagram right away so the ownership link
            // survives a restart; a failed write stays dirty and queued for
            // the background worker.
            if let Err(e) = super::persistence::flush_now(state, diagram_id).await {
                warn!(error = %e, %diagram_id, "initial diagram save failed; background worker will retry");
            }

            info!(%conversation_id, %diagram_id, "generation completed");
            Ok(GenerationOutcome::Completed { diagram_id, phase: Phase::Editing })
        }
        Err(reason) => {
            session.phase = Phase::Failed;
            let notice = push_assistant_message(
                session,
                &format!("Diagram generation failed: {reason}"),
                MessageStatus::Failed,
            );
            mirror_message_insert(&state.pool, conversation_id, &notice).await;
            mirror_phase_update(&state.pool, conversation_id, Phase::Failed).await;

            warn!(%conversation_id, reason, "generation failed");
            Ok(GenerationOutcome::Failed { phase: Phase::Failed, reason })
        }
    }
}

fn push_assistant_message(
    session: &mut crate::state::ConversationSession,
    content: &str,
    status: MessageStatus,
) -> Message {
    let message = Message {
        id: Uuid::new_v4(),
        role: Role::Assistant,
        content: content.to_owned(),
        status,
        created_at: now_ms(),
    };
    session.conversation.messages.push(message.clone());
    message
}

// =============================================================================
// PAYLOAD PARSING
// =============================================================================

/// Parse and validate a model response into a diagram payload. The error
/// string is user-facing, shown in the failure message.
fn parse_payload(text: &str) -> Result<GeneratedPayload, String> {
    let json = extract_json(text).ok_or_else(|| "the response contained no JSON object.".to_owned())?;
    let mut payload: GeneratedPayload = serde_json::from_str(json)
        .map_err(|e| format!("the response JSON did not match the expected shape ({e})."))?;

    for node in &mut payload.nodes {
        node.label = node.label.trim().to_owned();
    }
    for edge in &mut payload.edges {
        edge.label = edge.label.as_deref().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned);
    }

    let mut probe = Diagram::new(Uuid::nil(), "probe", DiagramType::UseCase);
    probe.nodes = payload.nodes.clone();
    probe.edges = payload.edges.clone();
    let violations = graph::validate(&probe);
    if violations.is_empty() {
        Ok(payload)
    } else {
        let listed = violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        Err(format!("the generated diagram was invalid: {listed}."))
    }
}

/// Pull the JSON object out of a model response: a ```json fenced block when
/// present, otherwise the outermost brace span.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].trim())
}

#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;
