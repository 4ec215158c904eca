//! Schema defaulting
//!
//! Persisted dashboards omit fields that hold their default value. Both sides
//! of a comparison are normalized first so that a missing field and a field
//! explicitly set to its default compare equal. A field set to `null` counts
//! as missing.

use serde_json::{json, Map, Value};

fn dashboard_defaults() -> [(&'static str, Value); 12] {
    [
        ("editable", json!(true)),
        ("graphTooltip", json!(0)),
        ("liveNow", json!(false)),
        ("fiscalYearStartMonth", json!(0)),
        ("weekStart", json!("")),
        ("timezone", json!("")),
        ("refresh", json!("")),
        ("tags", json!([])),
        ("links", json!([])),
        ("panels", json!([])),
        ("time", json!({"from": "now-6h", "to": "now"})),
        ("templating", json!({"list": []})),
    ]
}

fn panel_defaults() -> [(&'static str, Value); 6] {
    [
        ("transparent", json!(false)),
        ("links", json!([])),
        ("targets", json!([])),
        ("options", json!({})),
        ("fieldConfig", json!({"defaults": {}, "overrides": []})),
        ("title", json!("")),
    ]
}

fn variable_defaults() -> [(&'static str, Value); 6] {
    [
        ("hide", json!(0)),
        ("skipUrlSync", json!(false)),
        ("options", json!([])),
        ("multi", json!(false)),
        ("includeAll", json!(false)),
        ("current", json!({})),
    ]
}

fn fill<const N: usize>(object: &mut Map<String, Value>, defaults: [(&'static str, Value); N]) {
    for (key, value) in defaults {
        object.entry(key).or_insert(value);
    }
}

/// Fill missing dashboard, panel and variable fields with schema defaults
///
/// Values that are not JSON objects are left untouched.
pub fn apply_defaults(dashboard: &mut Value) {
    let Some(root) = dashboard.as_object_mut() else {
        return;
    };
    fill(root, dashboard_defaults());

    if let Some(panels) = root.get_mut("panels").and_then(Value::as_array_mut) {
        normalize_panels(panels);
    }

    if let Some(variables) = root
        .get_mut("templating")
        .and_then(|t| t.get_mut("list"))
        .and_then(Value::as_array_mut)
    {
        for variable in variables.iter_mut().filter_map(Value::as_object_mut) {
            fill(variable, variable_defaults());
            if variable.get("type").and_then(Value::as_str) == Some("adhoc") {
                variable.entry("filters").or_insert_with(|| json!([]));
            }
        }
    }
}

fn normalize_panels(panels: &mut [Value]) {
    for panel in panels.iter_mut().filter_map(Value::as_object_mut) {
        if panel.get("type").and_then(Value::as_str) == Some("row") {
            panel.entry("collapsed").or_insert(json!(false));
            if let Some(nested) = panel.get_mut("panels").and_then(Value::as_array_mut) {
                normalize_panels(nested);
            }
            continue;
        }
        fill(panel, panel_defaults());
    }
}

/// Remove every object field whose value is `null`, at any depth
///
/// Array elements are kept in place, only their contents are visited.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(object) => {
            object.retain(|_, field| !field.is_null());
            object.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Normalized copy of `dashboard`
#[must_use]
pub fn normalized(dashboard: &Value) -> Value {
    let mut copy = dashboard.clone();
    strip_nulls(&mut copy);
    apply_defaults(&mut copy);
    copy
}
