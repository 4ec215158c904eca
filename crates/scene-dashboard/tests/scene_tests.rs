use pretty_assertions::assert_eq;
use scene_dashboard::{kinds, DashboardError, DashboardScene, DashboardSceneOptions};
use scene_graph::traversal::find_all;
use scene_graph::ActivationState;
use scene_test_utils::{init_tracing, templated_dashboard, DashboardFixture};
use serde_json::{json, Value};

fn layout_dashboard() -> Value {
    DashboardFixture::new("Layout")
        .time("now-24h", "now")
        .refresh("30s")
        .field("graphTooltip", json!(1))
        .variable("job", "api")
        .panel(1, "Top")
        .row(10, "Expanded")
        .query_panel(2, "Requests", "sum(rate(http_requests{job=\"$job\"}[5m]))")
        .panel(3, "Errors")
        .panel_value(json!({
            "id": 11,
            "type": "row",
            "title": "Collapsed",
            "collapsed": true,
            "panels": [{"id": 4, "type": "table", "title": "Hidden"}]
        }))
        .build()
}

fn build(value: &Value, options: DashboardSceneOptions) -> DashboardScene {
    init_tracing();
    DashboardScene::from_json(value, options).unwrap()
}

fn panel_states(scene: &DashboardScene) -> Vec<(String, ActivationState)> {
    scene
        .panel_keys()
        .into_iter()
        .map(|key| {
            let id = scene.panel(&key).unwrap();
            let state = scene.graph().activation_state(id).unwrap();
            (key, state)
        })
        .collect()
}

#[test]
fn panels_follow_row_layout() {
    let scene = build(&layout_dashboard(), DashboardSceneOptions::default());
    let graph = scene.graph();

    assert_eq!(
        scene.panel_keys(),
        vec!["panel-1", "panel-2", "panel-3", "panel-4"]
    );

    let rows = find_all(graph, scene.root(), |node| node.is_kind(kinds::ROW));
    assert_eq!(rows.len(), 2);
    assert_eq!(graph.children(rows[0]).len(), 2);
    assert_eq!(graph.children(rows[1]).len(), 1);
    assert!(graph.state(rows[0]).unwrap().get("panels").is_none());
}

#[test]
fn automatic_policy_activates_every_panel() {
    let mut scene = build(&layout_dashboard(), DashboardSceneOptions::default());
    scene.activate().unwrap();

    assert!(scene.is_active());
    assert!(panel_states(&scene)
        .iter()
        .all(|(_, state)| *state == ActivationState::Active));
}

#[test]
fn lazy_policy_waits_for_explicit_panel_activation() {
    let options = DashboardSceneOptions::default().with_auto_activate_children(false);
    let mut scene = build(&layout_dashboard(), options);
    scene.activate().unwrap();

    assert!(scene.is_active());
    assert!(panel_states(&scene)
        .iter()
        .all(|(_, state)| *state == ActivationState::Inactive));

    let handle = scene.activate_panel("panel-2").unwrap();
    assert!(scene.graph().is_current(&handle));
    assert!(scene.graph().is_active(scene.panel("panel-2").unwrap()));
    assert!(!scene.graph().is_active(scene.panel("panel-3").unwrap()));

    scene.deactivate_panel("panel-2").unwrap();
    assert!(!scene.graph().is_current(&handle));
}

#[test]
fn panel_activation_requires_active_scene() {
    let options = DashboardSceneOptions::default().with_auto_activate_children(false);
    let mut scene = build(&layout_dashboard(), options);

    let err = scene.activate_panel("panel-1").unwrap_err();
    assert!(err.is_lifecycle_misuse());
}

#[test]
fn deactivation_releases_all_subscriptions() {
    let mut scene = build(&templated_dashboard(), DashboardSceneOptions::default());
    scene.activate().unwrap();
    assert!(scene.graph().subscription_count() > 0);

    scene.deactivate().unwrap();

    assert!(!scene.is_active());
    assert_eq!(scene.graph().subscription_count(), 0);
    assert!(panel_states(&scene)
        .iter()
        .all(|(_, state)| *state == ActivationState::Inactive));
}

#[test]
fn save_model_round_trips_loaded_dashboard() {
    let original = layout_dashboard();
    let mut scene = build(&original, DashboardSceneOptions::default());
    scene.activate().unwrap();

    assert_eq!(scene.save_model().unwrap(), original);
}

#[test]
fn save_model_reflects_edits() {
    let original = layout_dashboard();
    let mut scene = build(&original, DashboardSceneOptions::default());

    scene.set_panel_title("panel-3", "5xx").unwrap();
    scene.set_time_range("now-7d", "now").unwrap();
    scene.set_variable_value("job", json!("worker")).unwrap();
    scene.set_refresh("1m").unwrap();

    let saved = scene.save_model().unwrap();
    assert_eq!(saved["panels"][3]["title"], json!("5xx"));
    assert_eq!(saved["time"], json!({"from": "now-7d", "to": "now"}));
    assert_eq!(
        saved["templating"]["list"][0]["current"],
        json!({"text": "worker", "value": "worker"})
    );
    assert_eq!(saved["refresh"], json!("1m"));
    assert_eq!(saved["graphTooltip"], json!(1));
}

#[test]
fn behavior_state_is_not_persisted() {
    let original = templated_dashboard();
    let mut scene = build(&original, DashboardSceneOptions::default());
    scene.activate().unwrap();

    scene.set_variable_value("instance", json!("server-2")).unwrap();
    let panel = scene.panel("panel-1").unwrap();
    assert_eq!(scene.graph().state(panel).unwrap().get_u64("dataVersion"), Some(1));

    let saved = scene.save_model().unwrap();
    assert!(saved["panels"][0].get("dataVersion").is_none());
}

#[test]
fn added_panel_is_activated_when_scene_is_live() {
    let mut scene = build(&templated_dashboard(), DashboardSceneOptions::default());
    scene.activate().unwrap();

    let key = scene
        .add_panel(&json!({"type": "stat", "title": "New"}))
        .unwrap();

    assert_eq!(key, "panel-3");
    assert!(scene.graph().is_active(scene.panel(&key).unwrap()));
    assert_eq!(scene.save_model().unwrap()["panels"][2]["id"], json!(3));
}

#[test]
fn added_panel_stays_inactive_under_lazy_policy() {
    let options = DashboardSceneOptions::default().with_auto_activate_children(false);
    let mut scene = build(&templated_dashboard(), options);
    scene.activate().unwrap();

    let key = scene.add_panel(&json!({"id": 9, "type": "stat"})).unwrap();
    assert!(!scene.graph().is_active(scene.panel(&key).unwrap()));
}

#[test]
fn removed_panel_is_gone_with_its_subscriptions() {
    let mut scene = build(&templated_dashboard(), DashboardSceneOptions::default());
    scene.activate().unwrap();
    let panel = scene.panel("panel-1").unwrap();
    assert!(scene.graph().subscriptions_owned_by(panel) > 0);

    scene.remove_panel("panel-1").unwrap();

    assert!(!scene.graph().contains(panel));
    assert_eq!(scene.graph().subscriptions_owned_by(panel), 0);
    assert_eq!(scene.panel_keys(), vec!["panel-2"]);
    assert!(matches!(
        scene.remove_panel("panel-1"),
        Err(DashboardError::PanelNotFound(_))
    ));

    // variable edits must not reach the removed panel
    scene.set_variable_value("instance", json!("server-9")).unwrap();
}

#[test]
fn malformed_dashboard_is_rejected() {
    let err = DashboardScene::from_json(
        &json!({"panels": "not-a-list"}),
        DashboardSceneOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DashboardError::InvalidModel(_)));
}

#[test]
fn options_load_from_toml() {
    let options = DashboardSceneOptions::from_toml_str(
        r"
        auto_activate_children = false
        max_propagation_depth = 8

        [change_detection]
        debounce_ms = 50
        ignore_variable_value_changes = true
        ",
    )
    .unwrap();

    let mut scene = build(&templated_dashboard(), options);
    scene.activate().unwrap();

    assert_eq!(scene.graph().config().max_propagation_depth, 8);
    assert!(!scene.graph().is_active(scene.panel("panel-1").unwrap()));
    assert!(scene.options().change_detection.ignore_variable_value_changes);
}
