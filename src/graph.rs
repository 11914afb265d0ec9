//! Graph model — canonical diagram representation and validity rules.
//!
//! DESIGN
//! ======
//! The diagram is a flat node list plus a flat edge list. Node order is
//! creation order and doubles as z-order, so there is no separate z-index
//! field. Per-kind behavior (which connection handles a node exposes) is a
//! pure lookup table over the closed `NodeKind` set rather than anything
//! polymorphic, which keeps `validate` and `handles_for` total functions.
//!
//! Everything here is pure: no I/O, no locks, no clocks. Mutation lives in
//! the editor service; this module only answers "is this diagram valid" and
//! "what would the diagram look like with these collections swapped in".

use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// NODE / EDGE KINDS
// =============================================================================

/// The closed set of placeable node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Actor,
    #[serde(rename = "usecase")]
    UseCase,
    #[serde(rename = "system")]
    SystemBoundary,
}

impl NodeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::UseCase => "usecase",
            Self::SystemBoundary => "system",
        }
    }
}

/// Connection kinds between two node handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Association,
    Dependency,
}

/// Stereotype of a dependency edge. Only meaningful when `kind = Dependency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Include,
    Extend,
}

impl DependencyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Extend => "extend",
        }
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Side of a node a handle sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Whether a handle starts edges or receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleDirection {
    Source,
    Target,
}

impl HandleDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

/// A named, sided connection point on a node. Its wire id is
/// `"<side>-<direction>"`, e.g. `"right-source"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub side: Side,
    pub direction: HandleDirection,
}

impl Handle {
    #[must_use]
    pub fn id(self) -> String {
        format!("{}-{}", self.side.as_str(), self.direction.as_str())
    }
}

const fn handle(side: Side, direction: HandleDirection) -> Handle {
    Handle { side, direction }
}

/// Actor and use-case nodes connect from any side, in either direction.
const FULL_HANDLES: [Handle; 8] = [
    handle(Side::Top, HandleDirection::Source),
    handle(Side::Top, HandleDirection::Target),
    handle(Side::Bottom, HandleDirection::Source),
    handle(Side::Bottom, HandleDirection::Target),
    handle(Side::Left, HandleDirection::Source),
    handle(Side::Left, HandleDirection::Target),
    handle(Side::Right, HandleDirection::Source),
    handle(Side::Right, HandleDirection::Target),
];

/// System boundaries only connect on their vertical edges.
const SIDE_HANDLES: [Handle; 4] = [
    handle(Side::Left, HandleDirection::Source),
    handle(Side::Left, HandleDirection::Target),
    handle(Side::Right, HandleDirection::Source),
    handle(Side::Right, HandleDirection::Target),
];

/// Handle taxonomy as a pure function of node kind.
#[must_use]
pub fn handles_for(kind: NodeKind) -> &'static [Handle] {
    match kind {
        NodeKind::Actor | NodeKind::UseCase => &FULL_HANDLES,
        NodeKind::SystemBoundary => &SIDE_HANDLES,
    }
}

/// Whether `handle_id` names a handle a node of `kind` actually exposes.
#[must_use]
pub fn is_valid_handle(kind: NodeKind, handle_id: &str) -> bool {
    handles_for(kind).iter().any(|h| h.id() == handle_id)
}

// =============================================================================
// DIAGRAM TYPES
// =============================================================================

/// Canvas position in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Camera state for the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, zoom: 1.0 }
    }
}

/// A placed diagram element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Non-empty, trimmed. The editor enforces this on every commit.
    pub label: String,
    pub position: Position,
}

/// A directed connection between two node handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub kind: EdgeKind,
    pub source_node_id: String,
    pub source_handle_id: String,
    pub target_node_id: String,
    pub target_handle_id: String,
    /// User-authored label only. Synthesized dependency text is derived at
    /// display time by [`display_edge_label`] and never stored here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_kind: Option<DependencyKind>,
}

/// Which of the supported diagram kinds a diagram is. Only `UseCase` carries
/// the node/edge graph semantics modeled in this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    #[serde(rename = "usecase")]
    UseCase,
    Class,
    Sequence,
}

impl DiagramType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UseCase => "usecase",
            Self::Class => "class",
            Self::Sequence => "sequence",
        }
    }

    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "usecase" => Some(Self::UseCase),
            "class" => Some(Self::Class),
            "sequence" => Some(Self::Sequence),
            _ => None,
        }
    }
}

/// The full graph for one conversation: nodes, edges, and camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub id: Uuid,
    pub title: String,
    pub diagram_type: DiagramType,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub viewport: Viewport,
}

impl Diagram {
    /// An empty use-case diagram with a default viewport.
    #[must_use]
    pub fn new(id: Uuid, title: impl Into<String>, diagram_type: DiagramType) -> Self {
        Self {
            id,
            title: title.into(),
            diagram_type,
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: Viewport::default(),
        }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    #[must_use]
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn edge_mut(&mut self, id: &str) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// A single violated structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("duplicate edge id: {0}")]
    DuplicateEdgeId(String),
    #[error("edge {edge_id} references missing node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },
    #[error("edge {edge_id}: handle {handle_id} is not valid on {kind} node {node_id}")]
    InvalidHandle { edge_id: String, node_id: String, kind: &'static str, handle_id: String },
    #[error("node {0} has an empty label")]
    EmptyLabel(String),
}

/// Pure structural check. Empty result means the diagram is valid.
///
/// Checks, in order: node id uniqueness, edge id uniqueness, edge endpoints
/// resolve to existing nodes, endpoint handle ids belong to the handle set of
/// each endpoint's kind, and node labels are non-empty after trimming.
#[must_use]
pub fn validate(diagram: &Diagram) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut node_ids: HashSet<&str> = HashSet::with_capacity(diagram.nodes.len());
    for node in &diagram.nodes {
        if !node_ids.insert(node.id.as_str()) {
            violations.push(Violation::DuplicateNodeId(node.id.clone()));
        }
        if node.label.trim().is_empty() {
            violations.push(Violation::EmptyLabel(node.id.clone()));
        }
    }

    let mut edge_ids: HashSet<&str> = HashSet::with_capacity(diagram.edges.len());
    for edge in &diagram.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            violations.push(Violation::DuplicateEdgeId(edge.id.clone()));
        }
        check_endpoint(diagram, edge, &edge.source_node_id, &edge.source_handle_id, &mut violations);
        check_endpoint(diagram, edge, &edge.target_node_id, &edge.target_handle_id, &mut violations);
    }

    violations
}

fn check_endpoint(
    diagram: &Diagram,
    edge: &Edge,
    node_id: &str,
    handle_id: &str,
    violations: &mut Vec<Violation>,
) {
    let Some(node) = diagram.node(node_id) else {
        violations.push(Violation::DanglingEdge { edge_id: edge.id.clone(), node_id: node_id.to_owned() });
        return;
    };
    if !is_valid_handle(node.kind, handle_id) {
        violations.push(Violation::InvalidHandle {
            edge_id: edge.id.clone(),
            node_id: node_id.to_owned(),
            kind: node.kind.as_str(),
            handle_id: handle_id.to_owned(),
        });
    }
}

/// Replace the node and/or edge collections wholesale, keeping the original
/// diagram untouched unless the candidate passes [`validate`].
///
/// # Errors
///
/// Returns the violations of the candidate; the caller's diagram is never
/// partially mutated.
pub fn apply_patch(
    diagram: &Diagram,
    nodes: Option<Vec<Node>>,
    edges: Option<Vec<Edge>>,
) -> Result<Diagram, Vec<Violation>> {
    let mut candidate = diagram.clone();
    if let Some(nodes) = nodes {
        candidate.nodes = nodes;
    }
    if let Some(edges) = edges {
        candidate.edges = edges;
    }

    let violations = validate(&candidate);
    if violations.is_empty() { Ok(candidate) } else { Err(violations) }
}

// =============================================================================
// DISPLAY
// =============================================================================

/// The label text the canvas should render for an edge.
///
/// A dependency without a user-authored label shows its stereotype wrapped in
/// guillemets (`«include»` / `«extend»`). That text is derived here and must
/// never be written back into [`Edge::label`].
#[must_use]
pub fn display_edge_label(edge: &Edge) -> Option<Cow<'_, str>> {
    if let Some(label) = &edge.label {
        return Some(Cow::Borrowed(label.as_str()));
    }
    if edge.kind == EdgeKind::Dependency {
        let kind = edge.dependency_kind.unwrap_or(DependencyKind::Include);
        return Some(Cow::Owned(format!("\u{ab}{}\u{bb}", kind.as_str())));
    }
    None
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
