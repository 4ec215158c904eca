//! Pure dashboard diff
//!
//! Both trees are normalized, then walked in parallel. Objects compare by
//! key, `tags` arrays compare as sets and every other array compares element
//! by element in order. The walk stops at the first non-ignored difference.
//!
//! Ignorable categories:
//! - time: the top-level `time` object
//! - variable values: `current` of every `templating.list` entry, plus
//!   `filters` for adhoc variables and the `options` list (which carries the
//!   `selected` markers) for every other kind
//! - refresh: the top-level `refresh` interval

use crate::error::DetectorError;
use crate::message::{ChangeRequest, DashboardChangeInfo, ErrorReply};
use crate::normalize::normalized;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

const TIME_FIELD: &str = "time";
const REFRESH_FIELD: &str = "refresh";
const TEMPLATING_FIELD: &str = "templating";
const SET_FIELDS: &[&str] = &["tags"];

/// Categories left out of `has_changes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgnoreFlags {
    /// Skip the time range
    pub time: bool,
    /// Skip variable values
    pub variable_values: bool,
    /// Skip the refresh interval
    pub refresh: bool,
}

impl From<&ChangeRequest> for IgnoreFlags {
    fn from(request: &ChangeRequest) -> Self {
        Self {
            time: request.ignore_time_changes,
            variable_values: request.ignore_variable_value_changes,
            refresh: request.ignore_refresh_changes.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Classification {
    structural: bool,
    time: bool,
    variable_values: bool,
    refresh: bool,
}

/// Compare two dashboards, ignoring time and variable value edits on request
#[must_use]
pub fn detect_changes(
    initial: &Value,
    changed: &Value,
    ignore_time_changes: bool,
    ignore_variable_value_changes: bool,
) -> DashboardChangeInfo {
    let flags = IgnoreFlags {
        time: ignore_time_changes,
        variable_values: ignore_variable_value_changes,
        refresh: false,
    };
    let found = classify(initial, changed, flags);
    DashboardChangeInfo {
        has_changes: found.structural,
        has_time_changes: Some(found.time),
        has_variable_value_changes: Some(found.variable_values),
        has_refresh_change: None,
    }
}

/// Stateless diff engine behind the worker
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// Create detector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify the difference described by `request`
    ///
    /// `has_refresh_change` is reported only when the request carries the
    /// refresh flag.
    #[must_use]
    pub fn detect(&self, request: &ChangeRequest) -> DashboardChangeInfo {
        let found = classify(&request.initial, &request.changed, IgnoreFlags::from(request));
        DashboardChangeInfo {
            has_changes: found.structural,
            has_time_changes: Some(found.time),
            has_variable_value_changes: Some(found.variable_values),
            has_refresh_change: request.ignore_refresh_changes.map(|_| found.refresh),
        }
    }

    /// Decode a JSON request and classify it
    ///
    /// # Errors
    /// Returns [`DetectorError::InvalidMessage`] if `message` is not a valid request
    pub fn detect_message(&self, message: &str) -> Result<DashboardChangeInfo, DetectorError> {
        let request: ChangeRequest = serde_json::from_str(message)?;
        Ok(self.detect(&request))
    }
}

/// Wire entry point: JSON request in, JSON result or `{"error": ...}` out
#[must_use]
pub fn handle_message(message: &str) -> String {
    match ChangeDetector::new().detect_message(message) {
        Ok(info) => encode(&info),
        Err(err) => {
            tracing::warn!(error = %err, "rejecting change request");
            encode(&ErrorReply {
                error: err.to_string(),
            })
        }
    }
}

fn encode<T: Serialize>(reply: &T) -> String {
    serde_json::to_string(reply).unwrap_or_else(|err| {
        serde_json::json!({ "error": err.to_string() }).to_string()
    })
}

fn classify(initial: &Value, changed: &Value, flags: IgnoreFlags) -> Classification {
    let initial = normalized(initial);
    let changed = normalized(changed);

    let found = Classification {
        structural: !dashboards_equivalent(&initial, &changed, flags),
        time: initial.get(TIME_FIELD) != changed.get(TIME_FIELD),
        variable_values: variable_values_differ(&initial, &changed),
        refresh: initial.get(REFRESH_FIELD) != changed.get(REFRESH_FIELD),
    };

    tracing::debug!(
        has_changes = found.structural,
        time = found.time,
        variable_values = found.variable_values,
        refresh = found.refresh,
        "classified dashboard changes"
    );
    if found.structural && tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(paths = ?collect_diff_paths(&initial, &changed), "dashboard differences");
    }
    found
}

// ----------------------------------------------------------------------
// Comparison
// ----------------------------------------------------------------------

fn key_union<'a>(
    left: &'a Map<String, Value>,
    right: &'a Map<String, Value>,
) -> impl Iterator<Item = &'a str> {
    left.keys()
        .chain(right.keys().filter(move |key| !left.contains_key(*key)))
        .map(String::as_str)
}

fn equivalent(left: &Value, right: &Value, field: Option<&str>) -> bool {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => objects_equivalent(l, r, |_| false),
        (Value::Array(l), Value::Array(r)) if field.is_some_and(|f| SET_FIELDS.contains(&f)) => {
            as_set(l) == as_set(r)
        }
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| equivalent(a, b, None))
        }
        _ => left == right,
    }
}

fn objects_equivalent(
    left: &Map<String, Value>,
    right: &Map<String, Value>,
    skip: impl Fn(&str) -> bool,
) -> bool {
    key_union(left, right)
        .filter(|&key| !skip(key))
        .all(|key| match (left.get(key), right.get(key)) {
            (Some(l), Some(r)) => equivalent(l, r, Some(key)),
            _ => false,
        })
}

fn as_set(values: &[Value]) -> BTreeSet<String> {
    values.iter().map(Value::to_string).collect()
}

fn dashboards_equivalent(initial: &Value, changed: &Value, flags: IgnoreFlags) -> bool {
    let (Some(left), Some(right)) = (initial.as_object(), changed.as_object()) else {
        return equivalent(initial, changed, None);
    };

    key_union(left, right).all(|key| {
        if (flags.time && key == TIME_FIELD) || (flags.refresh && key == REFRESH_FIELD) {
            return true;
        }
        match (left.get(key), right.get(key)) {
            (Some(l), Some(r)) if flags.variable_values && key == TEMPLATING_FIELD => {
                templating_equivalent(l, r)
            }
            (Some(l), Some(r)) => equivalent(l, r, Some(key)),
            _ => false,
        }
    })
}

/// Compare `templating` with variable value fields left out
fn templating_equivalent(left: &Value, right: &Value) -> bool {
    let (Some(l), Some(r)) = (left.as_object(), right.as_object()) else {
        return equivalent(left, right, None);
    };
    if !objects_equivalent(l, r, |key| key == "list") {
        return false;
    }

    let (Some(l_list), Some(r_list)) = (variable_list(l), variable_list(r)) else {
        return equivalent(left, right, None);
    };

    l_list.len() == r_list.len()
        && l_list.iter().zip(r_list).all(|(a, b)| match (a.as_object(), b.as_object()) {
            (Some(a), Some(b)) => {
                let adhoc = is_adhoc(a) && is_adhoc(b);
                objects_equivalent(a, b, |key| is_value_field(key, adhoc))
            }
            _ => equivalent(a, b, None),
        })
}

fn variable_list(templating: &Map<String, Value>) -> Option<&[Value]> {
    match templating.get("list") {
        None => Some(&[][..]),
        Some(list) => list.as_array().map(Vec::as_slice),
    }
}

fn is_adhoc(variable: &Map<String, Value>) -> bool {
    variable.get("type").and_then(Value::as_str) == Some("adhoc")
}

fn is_value_field(key: &str, adhoc: bool) -> bool {
    match key {
        "current" => true,
        "filters" => adhoc,
        // selection state mirrored into the option list
        "options" => !adhoc,
        _ => false,
    }
}

fn variables(dashboard: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    dashboard
        .get(TEMPLATING_FIELD)
        .and_then(|t| t.get("list"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn str_field<'a>(variable: &'a Map<String, Value>, key: &str) -> &'a str {
    variable.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn variable_identity(variable: &Map<String, Value>) -> (&str, &str) {
    (str_field(variable, "name"), str_field(variable, "type"))
}

/// Any variable present on both sides, matched by name and type, has a different value
fn variable_values_differ(initial: &Value, changed: &Value) -> bool {
    let before: HashMap<(&str, &str), &Map<String, Value>> = variables(initial)
        .map(|variable| (variable_identity(variable), variable))
        .collect();

    variables(changed).any(|after| {
        before
            .get(&variable_identity(after))
            .is_some_and(|previous| {
                let adhoc = is_adhoc(after);
                ["current", "filters"]
                    .into_iter()
                    .filter(|key| is_value_field(key, adhoc))
                    .any(|key| previous.get(key) != after.get(key))
            })
    })
}

// ----------------------------------------------------------------------
// Paths
// ----------------------------------------------------------------------

/// Every differing path between two dashboards after normalization
///
/// Paths use `.` for object keys and `[i]` for array indices; `$` denotes
/// the root. Nothing is ignored.
#[must_use]
pub fn diff_paths(initial: &Value, changed: &Value) -> Vec<String> {
    collect_diff_paths(&normalized(initial), &normalized(changed))
}

fn collect_diff_paths(initial: &Value, changed: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk(initial, changed, "", None, &mut out);
    out
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}

fn walk(left: &Value, right: &Value, path: &str, field: Option<&str>, out: &mut Vec<String>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for key in key_union(l, r) {
                let next = child_path(path, key);
                match (l.get(key), r.get(key)) {
                    (Some(a), Some(b)) => walk(a, b, &next, Some(key), out),
                    _ => out.push(next),
                }
            }
        }
        (Value::Array(l), Value::Array(r)) if field.is_some_and(|f| SET_FIELDS.contains(&f)) => {
            if as_set(l) != as_set(r) {
                out.push(display_path(path));
            }
        }
        (Value::Array(l), Value::Array(r)) => {
            for index in 0..l.len().max(r.len()) {
                let next = format!("{path}[{index}]");
                match (l.get(index), r.get(index)) {
                    (Some(a), Some(b)) => walk(a, b, &next, None, out),
                    _ => out.push(next),
                }
            }
        }
        _ if left != right => out.push(display_path(path)),
        _ => {}
    }
}
