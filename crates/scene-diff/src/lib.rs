//! Scene Diff
//!
//! Decides whether an edited dashboard differs from its saved version, and
//! whether the difference is limited to the time range, variable values or
//! the refresh interval.
//!
//! The diff is a pure function over two JSON trees ([`detect_changes`],
//! [`ChangeDetector`]). [`ChangeDetectorWorker`] runs it off the caller's
//! thread with debouncing, speaking the JSON message contract defined in
//! [`message`].
//!
//! # Example
//!
//! ```rust
//! use scene_diff::detect_changes;
//! use serde_json::json;
//!
//! let initial = json!({"time": {"from": "now-1h", "to": "now"}});
//! let changed = json!({"time": {"from": "now-6h", "to": "now"}});
//!
//! let info = detect_changes(&initial, &changed, true, false);
//! assert!(!info.has_changes);
//! assert_eq!(info.has_time_changes, Some(true));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod detector;
mod error;
pub mod message;
pub mod normalize;
mod worker;

pub use detector::{detect_changes, diff_paths, handle_message, ChangeDetector, IgnoreFlags};
pub use error::DetectorError;
pub use message::{ChangeRequest, DashboardChangeInfo, ErrorReply};
pub use worker::{ChangeDetectorWorker, DetectionOutcome, Ticket, WorkerConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
