use proptest::prelude::*;
use scene_graph::traversal::{find_all, find_object};
use scene_graph::{
    allowed_transitions, patch, validate_transition, ActivationContext, ActivationState,
    FnBehavior, NodeId, ObjectState, SceneGraph, SceneNode,
};
use serde_json::json;
use std::sync::Arc;

fn any_state() -> impl Strategy<Value = ActivationState> {
    prop_oneof![
        Just(ActivationState::Inactive),
        Just(ActivationState::Activating),
        Just(ActivationState::Active),
        Just(ActivationState::Deactivating),
    ]
}

#[test]
fn test_inactive_transitions() {
    assert!(validate_transition(ActivationState::Inactive, ActivationState::Activating).is_ok());

    // Invalid
    assert!(validate_transition(ActivationState::Inactive, ActivationState::Active).is_err());
    assert!(validate_transition(ActivationState::Inactive, ActivationState::Deactivating).is_err());
}

#[test]
fn test_activating_can_roll_back() {
    assert!(validate_transition(ActivationState::Activating, ActivationState::Active).is_ok());
    assert!(validate_transition(ActivationState::Activating, ActivationState::Inactive).is_ok());
    assert!(validate_transition(ActivationState::Activating, ActivationState::Deactivating).is_err());
}

/// Ids of the panels in a dashboard-like tree with `rows` rows of `per_row` panels
fn build_rows(graph: &mut SceneGraph, rows: usize, per_row: usize) -> (NodeId, Vec<NodeId>) {
    let root = graph.insert(SceneNode::new("dashboard", "dash", ObjectState::new()));
    let mut rows_ids = Vec::new();
    for r in 0..rows {
        let row = graph
            .insert_child(root, SceneNode::new("row", format!("row-{r}"), ObjectState::new()))
            .unwrap();
        for p in 0..per_row {
            graph
                .insert_child(
                    row,
                    SceneNode::new("panel", format!("panel-{r}-{p}"), ObjectState::new()),
                )
                .unwrap();
        }
        rows_ids.push(row);
    }
    (root, rows_ids)
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_state(), to in any_state()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_every_update_yields_fresh_snapshot(values in prop::collection::vec(0u8..3, 1..20)) {
        let mut graph = SceneGraph::new();
        let node = graph.insert(SceneNode::new("panel", "p", ObjectState::new()));
        let mut seen: Vec<Arc<ObjectState>> = vec![graph.state(node).unwrap()];

        for value in values {
            let snapshot = graph.set_state(node, patch([("v", json!(value))])).unwrap();
            for earlier in &seen {
                prop_assert!(!Arc::ptr_eq(earlier, &snapshot));
            }
            prop_assert!(Arc::ptr_eq(&snapshot, &graph.state(node).unwrap()));
            seen.push(snapshot);
        }
    }

    #[test]
    fn prop_find_object_ignores_unrelated_siblings(
        rows in 2usize..5,
        per_row in 1usize..4,
        edits in prop::collection::vec((0usize..8, 0u8..4), 0..10),
    ) {
        let mut graph = SceneGraph::new();
        let (root, row_ids) = build_rows(&mut graph, rows, per_row);
        let target_key = "panel-0-0";
        let predicate = |n: &SceneNode| n.key().as_str() == target_key;

        let before = find_object(&graph, root, predicate);
        prop_assert!(before.is_some());

        // Mutate and grow rows other than the first
        for (row, value) in edits {
            let row = row_ids[1 + row % (rows - 1)];
            graph.set_state(row, patch([("value", json!(value))])).unwrap();
            graph
                .insert_child(row, SceneNode::new("panel", format!("extra-{value}"), ObjectState::new()))
                .unwrap();
        }

        prop_assert_eq!(find_object(&graph, root, predicate), before);
        prop_assert_eq!(find_object(&graph, root, predicate), before);
    }

    #[test]
    fn prop_find_all_is_stable(rows in 1usize..5, per_row in 0usize..4) {
        let mut graph = SceneGraph::new();
        let (root, _) = build_rows(&mut graph, rows, per_row);

        let first = find_all(&graph, root, |n| n.is_kind("panel"));
        let second = find_all(&graph, root, |n| n.is_kind("panel"));

        prop_assert_eq!(first.len(), rows * per_row);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_inactive_nodes_hold_no_subscriptions(ops in prop::collection::vec(any::<bool>(), 1..30)) {
        let mut graph = SceneGraph::new();
        let upstream = graph.insert(SceneNode::new("timeRange", "time", ObjectState::new()));
        let node = graph
            .insert_child(
                upstream,
                SceneNode::new("panel", "p", ObjectState::new()).with_behavior(FnBehavior::new(
                    "watch",
                    move |ctx: &mut ActivationContext<'_>| {
                        let host = ctx.host();
                        ctx.subscribe(upstream, |_, _| {})?;
                        ctx.subscribe(host, |_, _| {})?;
                        Ok(None)
                    },
                )),
            )
            .unwrap();

        for activate in ops {
            if activate {
                graph.activate(node).unwrap();
            } else {
                graph.deactivate(node).unwrap();
            }

            let expected = if graph.is_active(node) { 2 } else { 0 };
            prop_assert_eq!(graph.subscriptions_owned_by(node), expected);
            prop_assert_eq!(graph.node(upstream).unwrap().subscriber_count(), expected / 2);
        }
    }
}
