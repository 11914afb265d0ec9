use super::*;
use crate::graph::validate;
use crate::state::test_helpers;

fn pos(x: f64, y: f64) -> Position {
    Position { x, y }
}

fn connect_request(source: &str, target: &str, kind: EdgeKind) -> ConnectRequest {
    ConnectRequest {
        source_node_id: source.into(),
        source_handle_id: "right-source".into(),
        target_node_id: target.into(),
        target_handle_id: "left-target".into(),
        kind,
        dependency_kind: None,
    }
}

async fn diagram_snapshot(state: &crate::state::AppState, diagram_id: uuid::Uuid) -> crate::graph::Diagram {
    let diagrams = state.diagrams.read().await;
    diagrams.get(&diagram_id).unwrap().diagram.clone()
}

// =========================================================================
// add_node
// =========================================================================

#[tokio::test]
async fn add_node_appends_in_creation_order() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    let a = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let b = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Checkout")
        .await
        .unwrap();

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.nodes.len(), 2);
    assert_eq!(diagram.nodes[0].id, a.id);
    assert_eq!(diagram.nodes[1].id, b.id);
    assert!(validate(&diagram).is_empty());
}

#[tokio::test]
async fn add_node_empty_label_falls_back_to_kind_default() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    let node = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "   ")
        .await
        .unwrap();
    assert_eq!(node.label, "Actor");
}

#[tokio::test]
async fn add_node_trims_initial_label() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    let node = add_node(&state, diagram_id, NodeKind::UseCase, pos(0.0, 0.0), "  Checkout  ")
        .await
        .unwrap();
    assert_eq!(node.label, "Checkout");
}

#[tokio::test]
async fn add_node_unknown_diagram_errors() {
    let state = test_helpers::test_app_state();
    let result = add_node(&state, uuid::Uuid::new_v4(), NodeKind::Actor, pos(0.0, 0.0), "x").await;
    assert!(matches!(result.unwrap_err(), EditError::DiagramNotLoaded(_)));
}

#[tokio::test]
async fn add_node_marks_dirty() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();

    let diagrams = state.diagrams.read().await;
    let ds = diagrams.get(&diagram_id).unwrap();
    assert!(ds.dirty);
    assert_eq!(ds.revision, 1);
}

// =========================================================================
// move_node
// =========================================================================

#[tokio::test]
async fn move_node_updates_position_only() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let node = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();

    let moved = move_node(&state, diagram_id, &node.id, pos(50.0, 75.0)).await.unwrap();
    assert!(moved);

    let diagram = diagram_snapshot(&state, diagram_id).await;
    let node = diagram.node(&node.id).unwrap();
    assert!((node.position.x - 50.0).abs() < f64::EPSILON);
    assert!((node.position.y - 75.0).abs() < f64::EPSILON);
    assert_eq!(node.label, "Customer");
}

#[tokio::test]
async fn move_node_missing_id_is_a_no_op() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    let moved = move_node(&state, diagram_id, "ghost", pos(1.0, 2.0)).await.unwrap();
    assert!(!moved);

    let diagrams = state.diagrams.read().await;
    assert!(!diagrams.get(&diagram_id).unwrap().dirty);
}

// =========================================================================
// connect
// =========================================================================

#[tokio::test]
async fn actor_to_use_case_association_scenario() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let actor = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let use_case = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Checkout")
        .await
        .unwrap();

    let edge = connect(&state, diagram_id, connect_request(&actor.id, &use_case.id, EdgeKind::Association))
        .await
        .unwrap();

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.nodes.len(), 2);
    assert_eq!(diagram.edges.len(), 1);
    assert_eq!(edge.kind, EdgeKind::Association);
    assert!(edge.label.is_none());
    assert!(edge.dependency_kind.is_none());
    assert!(validate(&diagram).is_empty());
}

#[tokio::test]
async fn dependency_defaults_to_include() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let a = add_node(&state, diagram_id, NodeKind::UseCase, pos(0.0, 0.0), "Checkout")
        .await
        .unwrap();
    let b = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Pay")
        .await
        .unwrap();

    let edge = connect(&state, diagram_id, connect_request(&a.id, &b.id, EdgeKind::Dependency))
        .await
        .unwrap();
    assert_eq!(edge.dependency_kind, Some(DependencyKind::Include));
    // Synthesized display text is derived, never stored.
    assert!(edge.label.is_none());
}

#[tokio::test]
async fn dependency_extend_when_requested() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let a = add_node(&state, diagram_id, NodeKind::UseCase, pos(0.0, 0.0), "Checkout")
        .await
        .unwrap();
    let b = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Gift wrap")
        .await
        .unwrap();

    let mut request = connect_request(&a.id, &b.id, EdgeKind::Dependency);
    request.dependency_kind = Some(DependencyKind::Extend);
    let edge = connect(&state, diagram_id, request).await.unwrap();
    assert_eq!(edge.dependency_kind, Some(DependencyKind::Extend));
}

#[tokio::test]
async fn connect_rejects_handle_outside_node_set() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let boundary = add_node(&state, diagram_id, NodeKind::SystemBoundary, pos(0.0, 0.0), "Webshop")
        .await
        .unwrap();
    let use_case = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Checkout")
        .await
        .unwrap();

    // System boundaries have no top handles.
    let mut request = connect_request(&boundary.id, &use_case.id, EdgeKind::Association);
    request.source_handle_id = "top-source".into();
    let result = connect(&state, diagram_id, request).await;
    assert!(matches!(result.unwrap_err(), EditError::InvalidHandle { .. }));

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert!(diagram.edges.is_empty());
}

#[tokio::test]
async fn connect_rejects_handle_used_against_its_direction() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let a = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let b = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Checkout")
        .await
        .unwrap();

    let mut request = connect_request(&a.id, &b.id, EdgeKind::Association);
    request.source_handle_id = "right-target".into();
    let result = connect(&state, diagram_id, request).await;
    assert!(matches!(result.unwrap_err(), EditError::InvalidHandle { .. }));
}

#[tokio::test]
async fn connect_rejects_missing_node() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let a = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();

    let result = connect(&state, diagram_id, connect_request(&a.id, "ghost", EdgeKind::Association)).await;
    assert!(matches!(result.unwrap_err(), EditError::UnknownNode(id) if id == "ghost"));

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert!(diagram.edges.is_empty());
}

// =========================================================================
// relabel
// =========================================================================

#[tokio::test]
async fn relabel_commits_trimmed_text() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let node = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();

    let committed = relabel(&state, diagram_id, &node.id, " New ").await.unwrap();
    assert_eq!(committed.as_deref(), Some("New"));

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.node(&node.id).unwrap().label, "New");
}

#[tokio::test]
async fn relabel_empty_and_whitespace_retain_prior_label() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let node = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();

    assert!(relabel(&state, diagram_id, &node.id, "").await.unwrap().is_none());
    assert!(relabel(&state, diagram_id, &node.id, "   ").await.unwrap().is_none());

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.node(&node.id).unwrap().label, "Customer");
}

#[tokio::test]
async fn relabel_unchanged_text_is_not_a_new_commit() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let node = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let revision_before = {
        let diagrams = state.diagrams.read().await;
        diagrams.get(&diagram_id).unwrap().revision
    };

    assert!(relabel(&state, diagram_id, &node.id, " Customer ").await.unwrap().is_none());

    let diagrams = state.diagrams.read().await;
    assert_eq!(diagrams.get(&diagram_id).unwrap().revision, revision_before);
}

#[tokio::test]
async fn relabel_unknown_element_is_a_no_op() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    assert!(relabel(&state, diagram_id, "ghost", "Anything").await.unwrap().is_none());
}

#[tokio::test]
async fn relabel_sets_user_authored_edge_label() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let a = add_node(&state, diagram_id, NodeKind::UseCase, pos(0.0, 0.0), "Checkout")
        .await
        .unwrap();
    let b = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Pay")
        .await
        .unwrap();
    let edge = connect(&state, diagram_id, connect_request(&a.id, &b.id, EdgeKind::Dependency))
        .await
        .unwrap();

    let committed = relabel(&state, diagram_id, &edge.id, "uses").await.unwrap();
    assert_eq!(committed.as_deref(), Some("uses"));

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.edge(&edge.id).unwrap().label.as_deref(), Some("uses"));
}

#[test]
fn commit_label_rules() {
    assert_eq!(commit_label("Customer", " New "), Some("New".into()));
    assert_eq!(commit_label("Customer", ""), None);
    assert_eq!(commit_label("Customer", "   "), None);
    assert_eq!(commit_label("Customer", "Customer"), None);
    assert_eq!(commit_label("Customer", "  Customer  "), None);
}

// =========================================================================
// delete_selection
// =========================================================================

#[tokio::test]
async fn deleting_a_node_cascades_to_its_edges_and_no_others() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let actor = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let checkout = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Checkout")
        .await
        .unwrap();
    let pay = add_node(&state, diagram_id, NodeKind::UseCase, pos(400.0, 0.0), "Pay")
        .await
        .unwrap();
    let e1 = connect(&state, diagram_id, connect_request(&actor.id, &checkout.id, EdgeKind::Association))
        .await
        .unwrap();
    let e2 = connect(&state, diagram_id, connect_request(&checkout.id, &pay.id, EdgeKind::Dependency))
        .await
        .unwrap();
    let e3 = connect(&state, diagram_id, connect_request(&actor.id, &pay.id, EdgeKind::Association))
        .await
        .unwrap();

    let summary = delete_selection(&state, diagram_id, &[checkout.id.clone()], &[])
        .await
        .unwrap();
    assert_eq!(summary.removed_nodes, vec![checkout.id.clone()]);
    assert_eq!(summary.removed_edges.len(), 2);
    assert!(summary.removed_edges.contains(&e1.id));
    assert!(summary.removed_edges.contains(&e2.id));

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.nodes.len(), 2);
    assert_eq!(diagram.edges.len(), 1);
    assert_eq!(diagram.edges[0].id, e3.id);
    assert!(validate(&diagram).is_empty());
}

#[tokio::test]
async fn delete_selection_removes_named_edges() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let a = add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let b = add_node(&state, diagram_id, NodeKind::UseCase, pos(200.0, 0.0), "Checkout")
        .await
        .unwrap();
    let edge = connect(&state, diagram_id, connect_request(&a.id, &b.id, EdgeKind::Association))
        .await
        .unwrap();

    let summary = delete_selection(&state, diagram_id, &[], &[edge.id.clone()])
        .await
        .unwrap();
    assert!(summary.removed_nodes.is_empty());
    assert_eq!(summary.removed_edges, vec![edge.id]);

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert_eq!(diagram.nodes.len(), 2);
    assert!(diagram.edges.is_empty());
}

#[tokio::test]
async fn delete_selection_unknown_ids_is_a_no_op() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    add_node(&state, diagram_id, NodeKind::Actor, pos(0.0, 0.0), "Customer")
        .await
        .unwrap();
    let revision_before = {
        let diagrams = state.diagrams.read().await;
        diagrams.get(&diagram_id).unwrap().revision
    };

    let summary = delete_selection(&state, diagram_id, &["ghost".into()], &["phantom".into()])
        .await
        .unwrap();
    assert!(summary.removed_nodes.is_empty());
    assert!(summary.removed_edges.is_empty());

    let diagrams = state.diagrams.read().await;
    let ds = diagrams.get(&diagram_id).unwrap();
    assert_eq!(ds.diagram.nodes.len(), 1);
    assert_eq!(ds.revision, revision_before);
}

// =========================================================================
// palette drop
// =========================================================================

#[tokio::test]
async fn palette_node_tags_create_nodes() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    let outcome = apply_palette_drop(
        &state,
        diagram_id,
        "actor",
        pos(10.0, 20.0),
        &serde_json::json!({"label": "Customer"}),
    )
    .await
    .unwrap();
    let DropOutcome::NodeCreated { node } = outcome else {
        panic!("expected NodeCreated");
    };
    assert_eq!(node.kind, NodeKind::Actor);
    assert_eq!(node.label, "Customer");

    let outcome = apply_palette_drop(&state, diagram_id, "system", pos(0.0, 0.0), &serde_json::json!({}))
        .await
        .unwrap();
    assert!(matches!(outcome, DropOutcome::NodeCreated { node } if node.kind == NodeKind::SystemBoundary));
}

#[tokio::test]
async fn palette_edge_tags_select_tool_without_mutation() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    let outcome = apply_palette_drop(&state, diagram_id, "dependency", pos(0.0, 0.0), &serde_json::json!({}))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        DropOutcome::EdgeToolSelected { kind: EdgeKind::Dependency, dependency_kind: Some(DependencyKind::Include) }
    ));

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert!(diagram.nodes.is_empty());
    assert!(diagram.edges.is_empty());
}

#[tokio::test]
async fn palette_unknown_tag_errors() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;
    let result = apply_palette_drop(&state, diagram_id, "swimlane", pos(0.0, 0.0), &serde_json::json!({})).await;
    assert!(matches!(result.unwrap_err(), EditError::UnknownPaletteTag(tag) if tag == "swimlane"));
}

// =========================================================================
// viewport
// =========================================================================

#[tokio::test]
async fn set_viewport_persists_camera() {
    let state = test_helpers::test_app_state();
    let diagram_id = test_helpers::seed_diagram(&state).await;

    set_viewport(&state, diagram_id, crate::graph::Viewport { x: 5.0, y: -3.0, zoom: 1.5 })
        .await
        .unwrap();

    let diagram = diagram_snapshot(&state, diagram_id).await;
    assert!((diagram.viewport.zoom - 1.5).abs() < f64::EPSILON);
}
