//! Dashboard scene options
//!
//! All fields have defaults, so a TOML document only needs the keys it
//! overrides:
//!
//! ```toml
//! auto_activate_children = false
//!
//! [change_detection]
//! debounce_ms = 500
//! ignore_time_changes = true
//! ```

use crate::error::DashboardError;
use scene_diff::WorkerConfig;
use scene_graph::SceneGraphConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Change detection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectionOptions {
    /// Debounce window of the background worker, in milliseconds
    pub debounce_ms: u64,
    /// Do not count time range edits as unsaved changes
    pub ignore_time_changes: bool,
    /// Do not count variable value edits as unsaved changes
    pub ignore_variable_value_changes: bool,
    /// Do not count refresh interval edits as unsaved changes
    pub ignore_refresh_changes: bool,
}

impl Default for ChangeDetectionOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            ignore_time_changes: false,
            ignore_variable_value_changes: false,
            ignore_refresh_changes: false,
        }
    }
}

impl ChangeDetectionOptions {
    /// Worker configuration for these options
    #[must_use]
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new().with_debounce(Duration::from_millis(self.debounce_ms))
    }
}

/// Dashboard scene configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSceneOptions {
    /// Activating the scene activates every mounted panel
    ///
    /// When `false`, panels stay inactive until
    /// [`DashboardScene::activate_panel`](crate::DashboardScene::activate_panel)
    /// is called for them.
    pub auto_activate_children: bool,
    /// Limit on follow-up update rounds in the scene graph
    pub max_propagation_depth: usize,
    /// Change detection
    pub change_detection: ChangeDetectionOptions,
    /// Maximum number of cached query results
    pub query_cache_capacity: u64,
}

impl Default for DashboardSceneOptions {
    fn default() -> Self {
        Self {
            auto_activate_children: true,
            max_propagation_depth: SceneGraphConfig::default().max_propagation_depth,
            change_detection: ChangeDetectionOptions::default(),
            query_cache_capacity: 1_000,
        }
    }
}

impl DashboardSceneOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from TOML
    ///
    /// # Errors
    /// Returns [`DashboardError::Config`] if `source` is not valid TOML or has
    /// fields of the wrong type
    pub fn from_toml_str(source: &str) -> Result<Self, DashboardError> {
        Ok(toml::from_str(source)?)
    }

    /// With child activation policy
    #[inline]
    #[must_use]
    pub fn with_auto_activate_children(mut self, auto: bool) -> Self {
        self.auto_activate_children = auto;
        self
    }

    /// With propagation depth limit
    #[inline]
    #[must_use]
    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth;
        self
    }

    /// With change detection options
    #[inline]
    #[must_use]
    pub fn with_change_detection(mut self, options: ChangeDetectionOptions) -> Self {
        self.change_detection = options;
        self
    }

    /// With query cache capacity
    #[inline]
    #[must_use]
    pub fn with_query_cache_capacity(mut self, capacity: u64) -> Self {
        self.query_cache_capacity = capacity;
        self
    }

    /// Scene graph configuration for these options
    #[must_use]
    pub fn graph_config(&self) -> SceneGraphConfig {
        SceneGraphConfig::new().with_max_propagation_depth(self.max_propagation_depth)
    }
}
