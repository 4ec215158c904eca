//! Testing utilities for the scene graph workspace
//!
//! Dashboard fixtures and tracing setup shared by the workspace tests.

#![allow(missing_docs)]

use serde_json::{json, Map, Value};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install an env-filter subscriber once per test binary
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ----------------------------------------------------------------------
// Dashboard JSON fixtures
// ----------------------------------------------------------------------

/// Builder for dashboard JSON documents
#[derive(Debug, Clone)]
pub struct DashboardFixture {
    root: Map<String, Value>,
    panels: Vec<Value>,
    variables: Vec<Value>,
}

impl DashboardFixture {
    pub fn new(title: &str) -> Self {
        let mut root = Map::new();
        root.insert("uid".into(), json!(format!("{}-uid", title.to_lowercase())));
        root.insert("title".into(), json!(title));
        root.insert("schemaVersion".into(), json!(36));
        Self {
            root,
            panels: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn time(mut self, from: &str, to: &str) -> Self {
        self.root
            .insert("time".into(), json!({"from": from, "to": to}));
        self
    }

    pub fn refresh(mut self, interval: &str) -> Self {
        self.root.insert("refresh".into(), json!(interval));
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.root.insert("tags".into(), json!(tags));
        self
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.root.insert(key.into(), value);
        self
    }

    /// Plain panel with no targets
    pub fn panel(self, id: u64, title: &str) -> Self {
        self.panel_value(json!({"id": id, "type": "timeseries", "title": title}))
    }

    /// Panel with one query target
    pub fn query_panel(self, id: u64, title: &str, expr: &str) -> Self {
        self.panel_value(json!({
            "id": id,
            "type": "timeseries",
            "title": title,
            "targets": [{"refId": "A", "expr": expr}]
        }))
    }

    pub fn panel_value(mut self, panel: Value) -> Self {
        self.panels.push(panel);
        self
    }

    /// Expanded legacy row; following panels belong to it
    pub fn row(self, id: u64, title: &str) -> Self {
        self.panel_value(json!({"id": id, "type": "row", "title": title, "collapsed": false, "panels": []}))
    }

    /// Query variable with a single current value
    pub fn variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push(json!({
            "name": name,
            "type": "query",
            "query": format!("label_values({name})"),
            "current": {"text": value, "value": value}
        }));
        self
    }

    pub fn variable_value(mut self, variable: Value) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn build(self) -> Value {
        let mut root = self.root;
        root.insert("panels".into(), Value::Array(self.panels));
        root.insert("templating".into(), json!({"list": self.variables}));
        Value::Object(root)
    }
}

/// Dashboard with one panel and a one hour time range
pub fn sample_dashboard() -> Value {
    DashboardFixture::new("Sample")
        .panel(1, "A")
        .time("now-1h", "now")
        .build()
}

/// Dashboard with a variable and a panel querying it
pub fn templated_dashboard() -> Value {
    DashboardFixture::new("Templated")
        .time("now-1h", "now")
        .variable("instance", "server-1")
        .query_panel(1, "CPU", "rate(cpu{instance=\"$instance\"}[5m])")
        .panel(2, "Static")
        .build()
}

/// Copy of `dashboard` with `pointer` replaced by `value`
///
/// # Panics
/// Panics if `pointer` does not resolve
pub fn with_pointer(dashboard: &Value, pointer: &str, value: Value) -> Value {
    let mut copy = dashboard.clone();
    *copy
        .pointer_mut(pointer)
        .unwrap_or_else(|| panic!("no value at {pointer}")) = value;
    copy
}
