use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scene_diff::{
    detect_changes, diff_paths, handle_message, ChangeDetector, ChangeRequest, DashboardChangeInfo,
};
use scene_test_utils::{sample_dashboard, templated_dashboard, with_pointer, DashboardFixture};
use serde_json::{json, Value};

fn info(has_changes: bool, time: bool, variables: bool) -> DashboardChangeInfo {
    DashboardChangeInfo {
        has_changes,
        has_time_changes: Some(time),
        has_variable_value_changes: Some(variables),
        has_refresh_change: None,
    }
}

#[test]
fn time_only_change_respects_flag() {
    let initial = json!({
        "schemaVersion": 36,
        "panels": [{"id": 1, "title": "A"}],
        "time": {"from": "now-1h", "to": "now"}
    });
    let changed = with_pointer(&initial, "/time/from", json!("now-6h"));

    assert_eq!(detect_changes(&initial, &changed, true, false), info(false, true, false));
    assert_eq!(detect_changes(&initial, &changed, false, false), info(true, true, false));
}

#[test]
fn variable_value_change_respects_flag() {
    let initial = templated_dashboard();
    let changed = with_pointer(
        &initial,
        "/templating/list/0/current",
        json!({"text": "server-2", "value": "server-2"}),
    );

    assert_eq!(detect_changes(&initial, &changed, false, true), info(false, false, true));
    assert_eq!(detect_changes(&initial, &changed, false, false), info(true, false, true));
}

#[test]
fn variable_definition_change_is_structural() {
    let initial = templated_dashboard();
    let changed = with_pointer(&initial, "/templating/list/0/query", json!("label_values(job)"));

    let result = detect_changes(&initial, &changed, true, true);
    assert!(result.has_changes);
    assert_eq!(result.has_variable_value_changes, Some(false));
}

#[test]
fn renamed_variable_is_not_a_value_change() {
    let initial = templated_dashboard();
    let mut changed = with_pointer(&initial, "/templating/list/0/name", json!("host"));
    changed = with_pointer(&changed, "/templating/list/0/current/value", json!("server-9"));

    let result = detect_changes(&initial, &changed, false, true);
    assert!(result.has_changes);
    assert_eq!(result.has_variable_value_changes, Some(false));
}

#[test]
fn adhoc_filters_count_as_values() {
    let dashboard = |filters: Value| {
        DashboardFixture::new("Adhoc")
            .variable_value(json!({"name": "Filters", "type": "adhoc", "filters": filters}))
            .build()
    };
    let initial = dashboard(json!([]));
    let changed = dashboard(json!([{"key": "job", "operator": "=", "value": "api"}]));

    assert_eq!(detect_changes(&initial, &changed, false, true), info(false, false, true));
}

#[test]
fn selected_option_follows_current_value() {
    let dashboard = |value: &str| {
        DashboardFixture::new("Custom")
            .variable_value(json!({
                "name": "env",
                "type": "custom",
                "query": "dev,prod",
                "current": {"text": value, "value": value},
                "options": [
                    {"text": "dev", "value": "dev", "selected": value == "dev"},
                    {"text": "prod", "value": "prod", "selected": value == "prod"}
                ]
            }))
            .build()
    };
    let initial = dashboard("dev");
    let changed = dashboard("prod");

    assert_eq!(detect_changes(&initial, &changed, false, true), info(false, false, true));
    assert_eq!(detect_changes(&initial, &changed, false, false), info(true, false, true));
}

#[test]
fn null_field_equals_missing_field() {
    let initial = json!({
        "title": "A",
        "panels": [{"id": 1, "type": "stat", "targets": [{"refId": "A"}]}]
    });
    let changed = json!({
        "title": "A",
        "description": null,
        "refresh": null,
        "panels": [{
            "id": 1,
            "type": "stat",
            "description": null,
            "pluginVersion": null,
            "targets": [{"refId": "A", "datasource": null}]
        }]
    });

    assert_eq!(detect_changes(&initial, &changed, false, false), info(false, false, false));
    assert!(diff_paths(&initial, &changed).is_empty());
}

#[test]
fn missing_field_equals_explicit_default() {
    let initial = json!({"title": "A", "panels": [{"id": 1, "type": "stat"}]});
    let changed = json!({
        "title": "A",
        "editable": true,
        "tags": [],
        "panels": [{"id": 1, "type": "stat", "transparent": false, "targets": []}],
        "templating": {"list": []}
    });

    assert_eq!(detect_changes(&initial, &changed, false, false), info(false, false, false));
    assert!(diff_paths(&initial, &changed).is_empty());
}

#[test]
fn missing_field_differs_from_non_default() {
    let initial = json!({"title": "A"});
    let changed = json!({"title": "A", "editable": false});

    assert!(detect_changes(&initial, &changed, true, true).has_changes);
    assert_eq!(diff_paths(&initial, &changed), vec!["editable".to_string()]);
}

#[test]
fn row_panel_sequence_is_ordered() {
    let initial = DashboardFixture::new("Rows")
        .row(10, "First")
        .panel(1, "A")
        .row(11, "Second")
        .panel(2, "B")
        .build();
    let changed = DashboardFixture::new("Rows")
        .row(11, "Second")
        .panel(2, "B")
        .row(10, "First")
        .panel(1, "A")
        .build();

    assert!(detect_changes(&initial, &changed, true, true).has_changes);
}

#[test]
fn detector_reports_refresh_with_flag() {
    let initial = sample_dashboard();
    let mut changed = with_pointer(&initial, "/time/from", json!("now-6h"));
    changed
        .as_object_mut()
        .unwrap()
        .insert("refresh".into(), json!("30s"));

    let request = ChangeRequest::new(initial, changed)
        .ignore_time_changes(true)
        .ignore_refresh_changes(true);
    let result = ChangeDetector::new().detect(&request);

    assert_eq!(
        result,
        DashboardChangeInfo {
            has_changes: false,
            has_time_changes: Some(true),
            has_variable_value_changes: Some(false),
            has_refresh_change: Some(true),
        }
    );
}

#[test]
fn wire_round_trip_matches_contract() {
    let request = json!({
        "initial": {"schemaVersion": 36, "panels": [{"id": 1, "title": "A"}], "time": {"from": "now-1h", "to": "now"}},
        "changed": {"schemaVersion": 36, "panels": [{"id": 1, "title": "A"}], "time": {"from": "now-6h", "to": "now"}},
        "ignoreTimeChanges": true,
        "ignoreVariableValueChanges": false
    });

    let reply: Value = serde_json::from_str(&handle_message(&request.to_string())).unwrap();

    assert_eq!(
        reply,
        json!({"hasChanges": false, "hasTimeChanges": true, "hasVariableValueChanges": false})
    );
}

#[test]
fn wire_error_uses_result_channel_shape() {
    let reply: Value = serde_json::from_str(&handle_message(r#"{"initial": {}}"#)).unwrap();
    assert!(reply.get("error").is_some());
    assert!(reply.get("hasChanges").is_none());
}

fn as_refs(tags: &[String]) -> Vec<&str> {
    tags.iter().map(String::as_str).collect()
}

fn time_expr() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("now-5m".to_string()),
        Just("now-1h".to_string()),
        Just("now-6h".to_string()),
        Just("now-7d".to_string()),
    ]
}

proptest! {
    #[test]
    fn prop_time_only_edits_are_classified_by_flag(from_a in time_expr(), from_b in time_expr()) {
        let initial = DashboardFixture::new("P").panel(1, "A").time(&from_a, "now").build();
        let changed = DashboardFixture::new("P").panel(1, "A").time(&from_b, "now").build();
        let differs = from_a != from_b;

        let ignoring = detect_changes(&initial, &changed, true, false);
        let strict = detect_changes(&initial, &changed, false, false);

        prop_assert!(!ignoring.has_changes);
        prop_assert_eq!(strict.has_changes, differs);
        prop_assert_eq!(ignoring.has_time_changes, Some(differs));
        prop_assert_eq!(strict.has_time_changes, Some(differs));
    }

    #[test]
    fn prop_tag_order_never_matters(mut tags in prop::collection::vec("[a-z]{1,6}", 0..6)) {
        let initial = DashboardFixture::new("T").tags(&as_refs(&tags)).build();
        tags.reverse();
        let changed = DashboardFixture::new("T").tags(&as_refs(&tags)).build();

        prop_assert!(!detect_changes(&initial, &changed, false, false).has_changes);
    }

    #[test]
    fn prop_detection_is_symmetric(title_a in "[A-Z][a-z]{0,5}", title_b in "[A-Z][a-z]{0,5}") {
        let initial = DashboardFixture::new("S").panel(1, &title_a).build();
        let changed = DashboardFixture::new("S").panel(1, &title_b).build();

        prop_assert_eq!(
            detect_changes(&initial, &changed, false, false),
            detect_changes(&changed, &initial, false, false)
        );
    }
}
