//! Persisted dashboard JSON model
//!
//! Only the fields the scene needs are typed; everything else is carried in
//! `extra` so that a load/save cycle preserves unknown fields.
//!
//! Panels are stored flat. A row panel (`type: "row"`) that is expanded owns
//! the panels that follow it up to the next row; a collapsed row keeps its
//! panels nested under its own `panels` field.

use crate::error::DashboardError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dashboard document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    /// Unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Time range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRangeModel>,
    /// Refresh interval, e.g. `30s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Flat panel list including row panels
    #[serde(default)]
    pub panels: Vec<PanelModel>,
    /// Template variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templating: Option<TemplatingModel>,
    /// Unmodelled fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DashboardModel {
    /// Parse dashboard JSON
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if `value` does not have the
    /// expected shape
    pub fn from_value(value: &Value) -> Result<Self, DashboardError> {
        Ok(Self::deserialize(value)?)
    }

    /// Serialize back to JSON
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if serialization fails
    pub fn to_value(&self) -> Result<Value, DashboardError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Variables in declaration order
    #[must_use]
    pub fn variables(&self) -> &[VariableModel] {
        self.templating
            .as_ref()
            .map_or(&[][..], |templating| templating.list.as_slice())
    }

    /// Group the flat panel list into top-level layout items
    #[must_use]
    pub fn layout(&self) -> Vec<LayoutItem> {
        let mut items: Vec<LayoutItem> = Vec::new();
        let mut open_row: Option<(PanelModel, Vec<PanelModel>)> = None;

        for panel in &self.panels {
            if panel.is_row() {
                if let Some((row, panels)) = open_row.take() {
                    items.push(LayoutItem::Row { row, panels });
                }
                let mut row = panel.clone();
                let nested = row.panels.take().unwrap_or_default();
                if row.is_collapsed() {
                    items.push(LayoutItem::Row { row, panels: nested });
                } else {
                    open_row = Some((row, nested));
                }
            } else if let Some((_, panels)) = open_row.as_mut() {
                panels.push(panel.clone());
            } else {
                items.push(LayoutItem::Panel(panel.clone()));
            }
        }

        if let Some((row, panels)) = open_row {
            items.push(LayoutItem::Row { row, panels });
        }
        items
    }
}

/// Top-level layout entry
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutItem {
    /// Panel outside any row
    Panel(PanelModel),
    /// Row and the panels it owns
    Row {
        /// Row panel without its nested `panels`
        row: PanelModel,
        /// Owned panels in display order
        panels: Vec<PanelModel>,
    },
}

/// Flatten layout items back into the persisted panel list
///
/// Collapsed rows nest their panels; expanded rows are followed by them.
#[must_use]
pub fn flatten_layout(items: Vec<LayoutItem>) -> Vec<PanelModel> {
    let mut flat = Vec::new();
    for item in items {
        match item {
            LayoutItem::Panel(panel) => flat.push(panel),
            LayoutItem::Row { mut row, panels } => {
                if row.is_collapsed() {
                    row.panels = Some(panels);
                    flat.push(row);
                } else {
                    row.panels = Some(Vec::new());
                    flat.push(row);
                    flat.extend(panels);
                }
            }
        }
    }
    flat
}

/// Time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRangeModel {
    /// Start, e.g. `now-6h`
    pub from: String,
    /// End, e.g. `now`
    pub to: String,
    /// Unmodelled fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TimeRangeModel {
    fn default() -> Self {
        Self {
            from: "now-6h".to_string(),
            to: "now".to_string(),
            extra: Map::new(),
        }
    }
}

/// Panel or row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelModel {
    /// Numeric id, unique within the dashboard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Panel plugin id; `row` for rows
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether a row is collapsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    /// Nested panels of a row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panels: Option<Vec<PanelModel>>,
    /// Unmodelled fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PanelModel {
    /// Check if this is a row panel
    #[inline]
    #[must_use]
    pub fn is_row(&self) -> bool {
        self.kind.as_deref() == Some("row")
    }

    /// Check if this is a collapsed row
    #[inline]
    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.collapsed.unwrap_or(false)
    }

    /// Scene key; `position` disambiguates panels without an id
    #[must_use]
    pub fn scene_key(&self, position: usize) -> String {
        let prefix = if self.is_row() { "row" } else { "panel" };
        match self.id {
            Some(id) => format!("{prefix}-{id}"),
            None => format!("{prefix}-at-{position}"),
        }
    }
}

/// Template variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableModel {
    /// Name referenced as `$name`
    pub name: String,
    /// Variable type, e.g. `query` or `adhoc`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Selected value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
    /// Unmodelled fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `templating` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplatingModel {
    /// Variables in declaration order
    #[serde(default)]
    pub list: Vec<VariableModel>,
    /// Unmodelled fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// JSON object of a serializable model
pub(crate) fn to_object<T: Serialize>(model: &T) -> Result<Map<String, Value>, DashboardError> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(DashboardError::InvalidModel(serde::ser::Error::custom(format!(
            "expected JSON object, got {other}"
        )))),
    }
}

/// Decode a model from a JSON object
pub(crate) fn from_object<T: for<'de> Deserialize<'de>>(
    object: &Map<String, Value>,
) -> Result<T, DashboardError> {
    Ok(serde_json::from_value(Value::Object(object.clone()))?)
}
