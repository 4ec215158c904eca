//! Scene Dashboard
//!
//! Composition root that turns persisted dashboard JSON into a live scene
//! graph, wires the panel behaviors and tracks unsaved changes.
//!
//! - [`DashboardScene`]: builds the node tree and applies edits
//! - [`behaviors`]: query caching, variable dependencies and time compare
//! - [`QueryResultCache`]: per-panel query results with policy TTLs
//! - [`DashboardChangeTracker`]: compares the live scene with its saved model
//!
//! # Example
//!
//! ```rust
//! use scene_dashboard::{DashboardChangeTracker, DashboardScene, DashboardSceneOptions};
//! use serde_json::json;
//!
//! let dashboard = json!({
//!     "uid": "ops",
//!     "title": "Ops",
//!     "panels": [{"id": 1, "type": "timeseries", "title": "CPU"}]
//! });
//!
//! let mut scene = DashboardScene::from_json(&dashboard, DashboardSceneOptions::default())?;
//! scene.activate()?;
//!
//! let mut tracker = DashboardChangeTracker::for_scene(&scene)?;
//! scene.set_panel_title("panel-1", "CPU usage")?;
//! assert!(tracker.detect_now(&scene)?.has_changes);
//! # Ok::<(), scene_dashboard::DashboardError>(())
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod behaviors;
mod config;
mod error;
pub mod model;
mod query_cache;
mod scene;
mod tracker;

pub use behaviors::{CachePolicy, DashboardBehavior};
pub use config::{ChangeDetectionOptions, DashboardSceneOptions};
pub use error::DashboardError;
pub use model::DashboardModel;
pub use query_cache::{QueryKey, QueryResultCache};
pub use scene::DashboardScene;
pub use tracker::DashboardChangeTracker;

/// Node kinds used by the dashboard scene
pub mod kinds {
    /// Dashboard root
    pub const DASHBOARD: &str = "dashboard";
    /// Time range
    pub const TIME_RANGE: &str = "timeRange";
    /// Variable set
    pub const VARIABLES: &str = "variables";
    /// Single variable
    pub const VARIABLE: &str = "variable";
    /// Layout body
    pub const BODY: &str = "body";
    /// Row
    pub const ROW: &str = "row";
    /// Panel
    pub const PANEL: &str = "panel";
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
