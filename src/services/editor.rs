//! Editor service — interactive diagram mutations under graph invariants.
//!
//! DESIGN
//! ======
//! Every operation is atomic: it either fully applies to the in-memory
//! diagram and marks it dirty for debounced persistence, or it leaves the
//! diagram untouched. Operations addressing a missing node or edge id degrade
//! to no-ops instead of failing, which keeps the editing surface resilient to
//! races between UI events and model state.
//!
//! Label editing is commit-based: the canvas enters edit mode locally and the
//! model is only touched when the user commits, so cancelling an edit
//! trivially restores the pre-edit text. A committed empty or whitespace-only
//! label retains the prior label unchanged.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::graph::{self, DependencyKind, Edge, EdgeKind, Node, NodeKind, Position, Viewport};
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("diagram not loaded: {0}")]
    DiagramNotLoaded(Uuid),
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("handle {handle_id} is not valid on node {node_id}")]
    InvalidHandle { node_id: String, handle_id: String },
    #[error("unknown palette tag: {0}")]
    UnknownPaletteTag(String),
}

/// Parameters for creating an edge between two node handles.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub source_node_id: String,
    pub source_handle_id: String,
    pub target_node_id: String,
    pub target_handle_id: String,
    pub kind: EdgeKind,
    #[serde(default)]
    pub dependency_kind: Option<DependencyKind>,
}

/// What a delete operation actually removed, cascades included.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteSummary {
    pub removed_nodes: Vec<String>,
    pub removed_edges: Vec<String>,
}

// =============================================================================
// NODE OPERATIONS
// =============================================================================

/// Create a node at the end of the node sequence (renders above prior
/// nodes). An empty or whitespace initial label falls back to the kind's
/// default so the non-empty-label invariant holds from birth.
///
/// # Errors
///
/// Returns `DiagramNotLoaded` if the diagram isn't in memory.
pub async fn add_node(
    state: &AppState,
    diagram_id: Uuid,
    kind: NodeKind,
    position: Position,
    initial_label: &str,
) -> Result<Node, EditError> {
    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .get_mut(&diagram_id)
        .ok_or(EditError::DiagramNotLoaded(diagram_id))?;

    let label = match initial_label.trim() {
        "" => default_label(kind).to_owned(),
        trimmed => trimmed.to_owned(),
    };
    let node = Node { id: state.ids.next_id("node"), kind, label, position };

    ds.diagram.nodes.push(node.clone());
    ds.mark_dirty();
    debug_assert!(graph::validate(&ds.diagram).is_empty());

    Ok(node)
}

/// Update a node's position. A missing id is a silent no-op.
///
/// Returns whether a node was actually moved.
///
/// # Errors
///
/// Returns `DiagramNotLoaded` if the diagram isn't in memory.
pub async fn move_node(
    state: &AppState,
    diagram_id: Uuid,
    node_id: &str,
    position: Position,
) -> Result<bool, EditError> {
    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .get_mut(&diagram_id)
        .ok_or(EditError::DiagramNotLoaded(diagram_id))?;

    let Some(node) = ds.diagram.node_mut(node_id) else {
        debug!(%diagram_id, node_id, "move ignored: node not present");
        return Ok(false);
    };
    node.position = position;
    ds.mark_dirty();
    Ok(true)
}

// =============================================================================
// CONNECT
// =============================================================================

/// Create an edge between two handles. Rejected without any mutation when a
/// node is missing, a handle id is outside its node's handle set, or a handle
/// is used against its direction. A Dependency edge defaults its stereotype
/// to `include`; the displayed guillemet text stays derived (see
/// [`graph::display_edge_label`]) and is not written to `label`.
///
/// # Errors
///
/// Returns `UnknownNode` / `InvalidHandle` on rejection, `DiagramNotLoaded`
/// if the diagram isn't in memory.
pub async fn connect(state: &AppState, diagram_id: Uuid, request: ConnectRequest) -> Result<Edge, EditError> {
    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .get_mut(&diagram_id)
        .ok_or(EditError::DiagramNotLoaded(diagram_id))?;

    check_handle(&ds.diagram, &request.source_node_id, &request.source_handle_id, "-source")?;
    check_handle(&ds.diagram, &request.target_node_id, &request.target_handle_id, "-target")?;

    let dependency_kind = match request.kind {
        EdgeKind::Dependency => Some(request.dependency_kind.unwrap_or(DependencyKind::Include)),
        EdgeKind::Association => None,
    };
    let edge = Edge {
        id: state.ids.next_id("edge"),
        kind: request.kind,
        source_node_id: request.source_node_id,
        source_handle_id: request.source_handle_id,
        target_node_id: request.target_node_id,
        target_handle_id: request.target_handle_id,
        label: None,
        dependency_kind,
    };

    ds.diagram.edges.push(edge.clone());
    ds.mark_dirty();
    debug_assert!(graph::validate(&ds.diagram).is_empty());

    Ok(edge)
}

fn check_handle(
    diagram: &crate::graph::Diagram,
    node_id: &str,
    handle_id: &str,
    direction_suffix: &str,
) -> Result<(), EditError> {
    let node = diagram
        .node(node_id)
        .ok_or_else(|| EditError::UnknownNode(node_id.to_owned()))?;
    if !graph::is_valid_handle(node.kind, handle_id) || !handle_id.ends_with(direction_suffix) {
        return Err(EditError::InvalidHandle { node_id: node_id.to_owned(), handle_id: handle_id.to_owned() });
    }
    Ok(())
}

// =============================================================================
// RELABEL
// =============================================================================

/// Commit rule for a label edit: the trimmed text, only when it is non-empty
/// and differs from the current label.
#[must_use]
pub fn commit_label(current: &str, proposed: &str) -> Option<String> {
    let trimmed = proposed.trim();
    if trimmed.is_empty() || trimmed == current {
        return None;
    }
    Some(trimmed.to_owned())
}

/// Commit a label edit on a node or edge. Returns the committed label, or
/// `None` when the edit was rejected (empty, unchanged, or unknown id) and
/// the element keeps its prior label.
///
/// # Errors
///
/// Returns `DiagramNotLoaded` if the diagram isn't in memory.
pub async fn relabel(
    state: &AppState,
    diagram_id: Uuid,
    element_id: &str,
    text: &str,
) -> Result<Option<String>, EditError> {
    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .get_mut(&diagram_id)
        .ok_or(EditError::DiagramNotLoaded(diagram_id))?;

    if let Some(node) = ds.diagram.node_mut(element_id) {
        let Some(label) = commit_label(&node.label, text) else {
            return Ok(None);
        };
        node.label = label.clone();
        ds.mark_dirty();
        return Ok(Some(label));
    }

    if let Some(edge) = ds.diagram.edge_mut(element_id) {
        let Some(label) = commit_label(edge.label.as_deref().unwrap_or(""), text) else {
            return Ok(None);
        };
        edge.label = Some(label.clone());
        ds.mark_dirty();
        return Ok(Some(label));
    }

    debug!(%diagram_id, element_id, "relabel ignored: element not present");
    Ok(None)
}

// =============================================================================
// DELETE
// =============================================================================

/// Remove the named nodes and edges in one atomic step, cascading to every
/// edge that references a deleted node. Unknown ids are ignored.
///
/// # Errors
///
/// Returns `DiagramNotLoaded` if the diagram isn't in memory.
pub async fn delete_selection(
    state: &AppState,
    diagram_id: Uuid,
    node_ids: &[String],
    edge_ids: &[String],
) -> Result<DeleteSummary, EditError> {
    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .get_mut(&diagram_id)
        .ok_or(EditError::DiagramNotLoaded(diagram_id))?;

    let mut summary = DeleteSummary::default();

    ds.diagram.nodes.retain(|node| {
        if node_ids.contains(&node.id) {
            summary.removed_nodes.push(node.id.clone());
            false
        } else {
            true
        }
    });
    ds.diagram.edges.retain(|edge| {
        let named = edge_ids.contains(&edge.id);
        let cascaded = summary.removed_nodes.contains(&edge.source_node_id)
            || summary.removed_nodes.contains(&edge.target_node_id);
        if named || cascaded {
            summary.removed_edges.push(edge.id.clone());
            false
        } else {
            true
        }
    });

    if summary.removed_nodes.is_empty() && summary.removed_edges.is_empty() {
        debug!(%diagram_id, "delete ignored: nothing matched");
        return Ok(summary);
    }

    ds.mark_dirty();
    debug_assert!(graph::validate(&ds.diagram).is_empty());
    Ok(summary)
}

// =============================================================================
// VIEWPORT
// =============================================================================

/// Persist the canvas camera alongside the graph.
///
/// # Errors
///
/// Returns `DiagramNotLoaded` if the diagram isn't in memory.
pub async fn set_viewport(state: &AppState, diagram_id: Uuid, viewport: Viewport) -> Result<(), EditError> {
    let mut diagrams = state.diagrams.write().await;
    let ds = diagrams
        .get_mut(&diagram_id)
        .ok_or(EditError::DiagramNotLoaded(diagram_id))?;
    ds.diagram.viewport = viewport;
    ds.mark_dirty();
    Ok(())
}

// =============================================================================
// PALETTE DROP
// =============================================================================

/// What a palette drag-and-drop resolved to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum DropOutcome {
    /// A node was created on the canvas.
    NodeCreated { node: Node },
    /// An edge tool was picked up; the next connect gesture uses this kind.
    EdgeToolSelected { kind: EdgeKind, dependency_kind: Option<DependencyKind> },
}

/// Interpret a palette payload: a type tag plus an initial-data JSON blob.
/// Node tags create a node at the drop position; edge tags select the edge
/// tool without mutating the diagram.
///
/// # Errors
///
/// Returns `UnknownPaletteTag` for an unrecognized tag, `DiagramNotLoaded`
/// if the diagram isn't in memory.
pub async fn apply_palette_drop(
    state: &AppState,
    diagram_id: Uuid,
    type_tag: &str,
    position: Position,
    initial_data: &serde_json::Value,
) -> Result<DropOutcome, EditError> {
    let kind = match type_tag {
        "actor" => NodeKind::Actor,
        "usecase" => NodeKind::UseCase,
        "system" => NodeKind::SystemBoundary,
        "association" => {
            return Ok(DropOutcome::EdgeToolSelected { kind: EdgeKind::Association, dependency_kind: None });
        }
        "dependency" => {
            let dependency_kind = initial_data
                .get("dependencyKind")
                .and_then(|v| serde_json::from_value::<DependencyKind>(v.clone()).ok())
                .unwrap_or(DependencyKind::Include);
            return Ok(DropOutcome::EdgeToolSelected {
                kind: EdgeKind::Dependency,
                dependency_kind: Some(dependency_kind),
            });
        }
        other => return Err(EditError::UnknownPaletteTag(other.to_owned())),
    };

    let label = initial_data.get("label").and_then(|v| v.as_str()).unwrap_or("");
    let node = add_node(state, diagram_id, kind, position, label).await?;
    Ok(DropOutcome::NodeCreated { node })
}

fn default_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Actor => "Actor",
        NodeKind::UseCase => "Use Case",
        NodeKind::SystemBoundary => "System",
    }
}

#[cfg(test)]
#[path = "editor_test.rs"]
mod tests;
