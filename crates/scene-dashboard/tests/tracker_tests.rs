use scene_dashboard::{
    ChangeDetectionOptions, DashboardChangeTracker, DashboardError, DashboardScene,
    DashboardSceneOptions,
};
use scene_test_utils::{init_tracing, templated_dashboard, DashboardFixture};
use serde_json::json;
use std::time::Duration;

fn scene_with(change_detection: ChangeDetectionOptions) -> DashboardScene {
    init_tracing();
    let options = DashboardSceneOptions::default().with_change_detection(change_detection);
    let mut scene = DashboardScene::from_json(&templated_dashboard(), options).unwrap();
    scene.activate().unwrap();
    scene
}

fn scene() -> DashboardScene {
    scene_with(ChangeDetectionOptions::default())
}

#[test]
fn loaded_scene_has_no_changes() {
    let scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();

    let info = tracker.detect_now(&scene).unwrap();
    assert!(!info.has_changes);
    assert_eq!(info.has_time_changes, Some(false));
    assert_eq!(info.has_variable_value_changes, Some(false));
}

#[test]
fn activation_side_effects_are_not_changes() {
    let mut scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();

    // bumps dataVersion on the dependent panel
    scene.set_variable_value("instance", json!("server-2")).unwrap();
    scene.set_variable_value("instance", json!("server-1")).unwrap();

    assert!(!tracker.detect_now(&scene).unwrap().has_changes);
}

#[test]
fn time_change_respects_ignore_option() {
    let mut strict = scene();
    let mut strict_tracker = DashboardChangeTracker::for_scene(&strict).unwrap();
    strict.set_time_range("now-7d", "now").unwrap();
    let info = strict_tracker.detect_now(&strict).unwrap();
    assert!(info.has_changes);
    assert!(info.time_changed());

    let mut lenient = scene_with(ChangeDetectionOptions {
        ignore_time_changes: true,
        ..ChangeDetectionOptions::default()
    });
    let mut lenient_tracker = DashboardChangeTracker::for_scene(&lenient).unwrap();
    lenient.set_time_range("now-7d", "now").unwrap();
    let info = lenient_tracker.detect_now(&lenient).unwrap();
    assert!(!info.has_changes);
    assert!(info.time_changed());
    assert!(!lenient_tracker.has_changes());
}

#[test]
fn variable_value_change_respects_ignore_option() {
    let mut scene = scene_with(ChangeDetectionOptions {
        ignore_variable_value_changes: true,
        ..ChangeDetectionOptions::default()
    });
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();

    scene.set_variable_value("instance", json!("server-2")).unwrap();
    let info = tracker.detect_now(&scene).unwrap();
    assert!(!info.has_changes);
    assert!(info.variable_values_changed());

    scene.set_panel_title("panel-2", "Renamed").unwrap();
    assert!(tracker.detect_now(&scene).unwrap().has_changes);
}

#[test]
fn refresh_change_is_reported() {
    let mut scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();

    scene.set_refresh("30s").unwrap();
    let info = tracker.detect_now(&scene).unwrap();
    assert!(info.has_changes);
    assert_eq!(info.has_refresh_change, Some(true));
}

#[test]
fn mark_saved_resets_baseline() {
    let mut scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();

    scene.set_panel_title("panel-1", "Load").unwrap();
    assert!(tracker.detect_now(&scene).unwrap().has_changes);

    tracker.mark_saved(&scene).unwrap();
    assert!(!tracker.has_changes());
    assert!(tracker.last_result().is_none());
    assert!(!tracker.detect_now(&scene).unwrap().has_changes);
    assert_eq!(tracker.initial()["panels"][0]["title"], json!("Load"));
}

#[test]
fn removed_panel_is_a_change() {
    let dashboard = DashboardFixture::new("Two").panel(1, "A").panel(2, "B").build();
    let mut scene = DashboardScene::from_json(&dashboard, DashboardSceneOptions::default()).unwrap();
    let mut tracker = DashboardChangeTracker::new(dashboard, ChangeDetectionOptions::default());

    assert!(!tracker.detect_now(&scene).unwrap().has_changes);
    scene.remove_panel("panel-2").unwrap();
    assert!(tracker.detect_now(&scene).unwrap().has_changes);
}

#[tokio::test(start_paused = true)]
async fn worker_collapses_burst_of_edits() {
    let mut scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();
    let mut results = tracker.start_worker();

    scene.set_panel_title("panel-1", "one").unwrap();
    tracker.schedule(&scene).unwrap();
    scene.set_panel_title("panel-1", "two").unwrap();
    tracker.schedule(&scene).unwrap();
    scene.set_panel_title("panel-1", "CPU").unwrap();
    let last = tracker.schedule(&scene).unwrap();
    assert_eq!(tracker.pending(), Some(last));

    let info = tracker.next_outcome(&mut results).await;

    // only the final request is diffed, and it matches the saved title
    assert!(!info.has_changes);
    assert!(tracker.pending().is_none());
    assert!(
        tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn worker_result_marks_scene_dirty() {
    let mut scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();
    let mut results = tracker.start_worker();

    scene.set_refresh("5m").unwrap();
    tracker.schedule(&scene).unwrap();
    let info = tracker.next_outcome(&mut results).await;

    assert!(info.has_changes);
    assert!(tracker.has_changes());
    assert_eq!(tracker.last_result(), Some(info));
}

#[tokio::test(start_paused = true)]
async fn stopped_worker_flushes_then_counts_as_changed() {
    let mut scene = scene();
    let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();
    let mut results = tracker.start_worker();

    tracker.schedule(&scene).unwrap();
    tracker.stop_worker().await.unwrap();

    assert!(!tracker.next_outcome(&mut results).await.has_changes);
    assert!(tracker.next_outcome(&mut results).await.has_changes);

    scene.set_panel_title("panel-1", "after").unwrap();
    let err = tracker.schedule(&scene).unwrap_err();
    assert!(matches!(err, DashboardError::Detector(_)));
    assert!(tracker.has_changes());
}
