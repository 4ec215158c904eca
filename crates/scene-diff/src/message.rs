//! Worker wire contract
//!
//! Field names are camelCase on the wire; optional result flags are omitted
//! when absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request posted to the change detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    /// Dashboard as last saved
    pub initial: Value,
    /// Dashboard as currently edited
    pub changed: Value,
    /// Do not count time range edits as changes
    #[serde(default)]
    pub ignore_time_changes: bool,
    /// Do not count variable value edits as changes
    #[serde(default)]
    pub ignore_variable_value_changes: bool,
    /// Do not count refresh interval edits as changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_refresh_changes: Option<bool>,
}

impl ChangeRequest {
    /// Create request with every flag cleared
    #[must_use]
    pub fn new(initial: Value, changed: Value) -> Self {
        Self {
            initial,
            changed,
            ignore_time_changes: false,
            ignore_variable_value_changes: false,
            ignore_refresh_changes: None,
        }
    }

    /// Ignore time range edits
    #[inline]
    #[must_use]
    pub fn ignore_time_changes(mut self, ignore: bool) -> Self {
        self.ignore_time_changes = ignore;
        self
    }

    /// Ignore variable value edits
    #[inline]
    #[must_use]
    pub fn ignore_variable_value_changes(mut self, ignore: bool) -> Self {
        self.ignore_variable_value_changes = ignore;
        self
    }

    /// Ignore refresh interval edits
    #[inline]
    #[must_use]
    pub fn ignore_refresh_changes(mut self, ignore: bool) -> Self {
        self.ignore_refresh_changes = Some(ignore);
        self
    }
}

/// Classification of the difference between two dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardChangeInfo {
    /// A non-ignored field differs
    pub has_changes: bool,
    /// The time range differs, whether ignored or not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_time_changes: Option<bool>,
    /// A variable value differs, whether ignored or not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_variable_value_changes: Option<bool>,
    /// The refresh interval differs, whether ignored or not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_refresh_change: Option<bool>,
}

impl DashboardChangeInfo {
    /// Result for identical dashboards
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Conservative result used when detection could not run
    #[must_use]
    pub fn assume_changed() -> Self {
        Self {
            has_changes: true,
            ..Self::default()
        }
    }

    /// Time range differs
    #[inline]
    #[must_use]
    pub fn time_changed(&self) -> bool {
        self.has_time_changes.unwrap_or(false)
    }

    /// A variable value differs
    #[inline]
    #[must_use]
    pub fn variable_values_changed(&self) -> bool {
        self.has_variable_value_changes.unwrap_or(false)
    }

    /// Refresh interval differs
    #[inline]
    #[must_use]
    pub fn refresh_changed(&self) -> bool {
        self.has_refresh_change.unwrap_or(false)
    }
}

/// Error reply sent on the result channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Human-readable failure
    pub error: String,
}
