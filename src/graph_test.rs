use super::*;

fn actor(id: &str, label: &str) -> Node {
    Node { id: id.into(), kind: NodeKind::Actor, label: label.into(), position: Position { x: 0.0, y: 0.0 } }
}

fn use_case(id: &str, label: &str) -> Node {
    Node { id: id.into(), kind: NodeKind::UseCase, label: label.into(), position: Position { x: 200.0, y: 0.0 } }
}

fn boundary(id: &str, label: &str) -> Node {
    Node {
        id: id.into(),
        kind: NodeKind::SystemBoundary,
        label: label.into(),
        position: Position { x: 100.0, y: -50.0 },
    }
}

fn association(id: &str, source: &str, target: &str) -> Edge {
    Edge {
        id: id.into(),
        kind: EdgeKind::Association,
        source_node_id: source.into(),
        source_handle_id: "right-source".into(),
        target_node_id: target.into(),
        target_handle_id: "left-target".into(),
        label: None,
        dependency_kind: None,
    }
}

fn diagram_with(nodes: Vec<Node>, edges: Vec<Edge>) -> Diagram {
    let mut d = Diagram::new(Uuid::new_v4(), "Shop", DiagramType::UseCase);
    d.nodes = nodes;
    d.edges = edges;
    d
}

// =========================================================================
// handles
// =========================================================================

#[test]
fn actor_and_use_case_expose_all_sides_both_directions() {
    for kind in [NodeKind::Actor, NodeKind::UseCase] {
        let handles = handles_for(kind);
        assert_eq!(handles.len(), 8);
        for side in ["top", "bottom", "left", "right"] {
            assert!(is_valid_handle(kind, &format!("{side}-source")));
            assert!(is_valid_handle(kind, &format!("{side}-target")));
        }
    }
}

#[test]
fn system_boundary_exposes_only_left_and_right() {
    let handles = handles_for(NodeKind::SystemBoundary);
    assert_eq!(handles.len(), 4);
    assert!(is_valid_handle(NodeKind::SystemBoundary, "left-source"));
    assert!(is_valid_handle(NodeKind::SystemBoundary, "right-target"));
    assert!(!is_valid_handle(NodeKind::SystemBoundary, "top-source"));
    assert!(!is_valid_handle(NodeKind::SystemBoundary, "bottom-target"));
}

#[test]
fn handle_id_format() {
    let h = Handle { side: Side::Right, direction: HandleDirection::Source };
    assert_eq!(h.id(), "right-source");
}

#[test]
fn garbage_handle_id_is_invalid_for_every_kind() {
    for kind in [NodeKind::Actor, NodeKind::UseCase, NodeKind::SystemBoundary] {
        assert!(!is_valid_handle(kind, "middle-source"));
        assert!(!is_valid_handle(kind, "right"));
        assert!(!is_valid_handle(kind, ""));
    }
}

// =========================================================================
// validate
// =========================================================================

#[test]
fn empty_diagram_is_valid() {
    let d = Diagram::new(Uuid::new_v4(), "Empty", DiagramType::UseCase);
    assert!(validate(&d).is_empty());
}

#[test]
fn two_nodes_one_edge_is_valid() {
    let d = diagram_with(
        vec![actor("a1", "Customer"), use_case("u1", "Checkout")],
        vec![association("e1", "a1", "u1")],
    );
    assert!(validate(&d).is_empty());
}

#[test]
fn duplicate_node_id_is_flagged() {
    let d = diagram_with(vec![actor("a1", "Customer"), use_case("a1", "Checkout")], vec![]);
    assert_eq!(validate(&d), vec![Violation::DuplicateNodeId("a1".into())]);
}

#[test]
fn duplicate_edge_id_is_flagged() {
    let d = diagram_with(
        vec![actor("a1", "Customer"), use_case("u1", "Checkout")],
        vec![association("e1", "a1", "u1"), association("e1", "a1", "u1")],
    );
    assert!(validate(&d).contains(&Violation::DuplicateEdgeId("e1".into())));
}

#[test]
fn dangling_edge_is_flagged() {
    let d = diagram_with(vec![actor("a1", "Customer")], vec![association("e1", "a1", "ghost")]);
    assert_eq!(
        validate(&d),
        vec![Violation::DanglingEdge { edge_id: "e1".into(), node_id: "ghost".into() }]
    );
}

#[test]
fn invalid_handle_on_system_boundary_is_flagged() {
    let mut edge = association("e1", "s1", "u1");
    edge.source_handle_id = "top-source".into();
    let d = diagram_with(vec![boundary("s1", "Webshop"), use_case("u1", "Checkout")], vec![edge]);
    let violations = validate(&d);
    assert_eq!(violations.len(), 1);
    assert!(matches!(
        &violations[0],
        Violation::InvalidHandle { edge_id, node_id, kind, handle_id }
            if edge_id == "e1" && node_id == "s1" && *kind == "system" && handle_id == "top-source"
    ));
}

#[test]
fn empty_and_whitespace_labels_are_flagged() {
    let d = diagram_with(vec![actor("a1", ""), use_case("u1", "   ")], vec![]);
    let violations = validate(&d);
    assert!(violations.contains(&Violation::EmptyLabel("a1".into())));
    assert!(violations.contains(&Violation::EmptyLabel("u1".into())));
}

// =========================================================================
// apply_patch
// =========================================================================

#[test]
fn apply_patch_replaces_collections_when_valid() {
    let d = diagram_with(vec![actor("a1", "Customer")], vec![]);
    let patched = apply_patch(
        &d,
        Some(vec![actor("a1", "Customer"), use_case("u1", "Checkout")]),
        Some(vec![association("e1", "a1", "u1")]),
    )
    .unwrap();
    assert_eq!(patched.nodes.len(), 2);
    assert_eq!(patched.edges.len(), 1);
    // Original untouched.
    assert_eq!(d.nodes.len(), 1);
    assert!(d.edges.is_empty());
}

#[test]
fn apply_patch_rejects_invalid_candidate_wholesale() {
    let d = diagram_with(vec![actor("a1", "Customer")], vec![]);
    let result = apply_patch(&d, None, Some(vec![association("e1", "a1", "ghost")]));
    assert!(result.is_err());
    assert!(d.edges.is_empty());
}

#[test]
fn apply_patch_none_none_is_identity() {
    let d = diagram_with(
        vec![actor("a1", "Customer"), use_case("u1", "Checkout")],
        vec![association("e1", "a1", "u1")],
    );
    let patched = apply_patch(&d, None, None).unwrap();
    assert_eq!(patched, d);
}

// =========================================================================
// serde round trip
// =========================================================================

#[test]
fn diagram_serde_round_trip() {
    let mut edge = association("e1", "a1", "u1");
    edge.kind = EdgeKind::Dependency;
    edge.dependency_kind = Some(DependencyKind::Extend);
    let mut d = diagram_with(vec![actor("a1", "Customer"), use_case("u1", "Checkout")], vec![edge]);
    d.viewport = Viewport { x: 10.0, y: -20.0, zoom: 0.75 };

    let json = serde_json::to_string(&d).unwrap();
    let restored: Diagram = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, d);
}

#[test]
fn edge_serializes_camel_case_wire_shape() {
    let edge = association("e1", "a1", "u1");
    let json = serde_json::to_value(&edge).unwrap();
    assert_eq!(json.get("sourceNodeId").and_then(|v| v.as_str()), Some("a1"));
    assert_eq!(json.get("targetHandleId").and_then(|v| v.as_str()), Some("left-target"));
    // Unset optional fields stay off the wire.
    assert!(json.get("label").is_none());
    assert!(json.get("dependencyKind").is_none());
}

#[test]
fn node_kind_wire_tags() {
    assert_eq!(serde_json::to_value(NodeKind::Actor).unwrap(), "actor");
    assert_eq!(serde_json::to_value(NodeKind::UseCase).unwrap(), "usecase");
    assert_eq!(serde_json::to_value(NodeKind::SystemBoundary).unwrap(), "system");
    let kind: NodeKind = serde_json::from_value(serde_json::json!("system")).unwrap();
    assert_eq!(kind, NodeKind::SystemBoundary);
}

// =========================================================================
// display_edge_label
// =========================================================================

#[test]
fn association_without_label_shows_nothing() {
    let edge = association("e1", "a1", "u1");
    assert!(display_edge_label(&edge).is_none());
}

#[test]
fn dependency_without_label_synthesizes_guillemets() {
    let mut edge = association("e1", "u1", "u2");
    edge.kind = EdgeKind::Dependency;
    edge.dependency_kind = Some(DependencyKind::Include);
    assert_eq!(display_edge_label(&edge).unwrap(), "\u{ab}include\u{bb}");

    edge.dependency_kind = Some(DependencyKind::Extend);
    assert_eq!(display_edge_label(&edge).unwrap(), "\u{ab}extend\u{bb}");
}

#[test]
fn user_label_wins_over_synthesis() {
    let mut edge = association("e1", "u1", "u2");
    edge.kind = EdgeKind::Dependency;
    edge.dependency_kind = Some(DependencyKind::Include);
    edge.label = Some("uses".into());
    assert_eq!(display_edge_label(&edge).unwrap(), "uses");
}

#[test]
fn synthesized_label_never_reaches_the_wire() {
    let mut edge = association("e1", "u1", "u2");
    edge.kind = EdgeKind::Dependency;
    edge.dependency_kind = Some(DependencyKind::Include);
    let json = serde_json::to_value(&edge).unwrap();
    assert!(json.get("label").is_none());
    assert_eq!(json.get("dependencyKind").and_then(|v| v.as_str()), Some("include"));
}
