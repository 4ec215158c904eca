//! Scene Graph
//!
//! A reactive, hierarchically composed state graph. Nodes own immutable
//! state, subscribe to each other only while active, and attach behaviors
//! that react to their host's lifecycle.
//!
//! # Core Concepts
//!
//! - [`StateContainer<S>`]: immutable state with shallow-merge updates and ordered listeners
//! - [`SceneNode`]: state + tree links + behaviors
//! - [`SceneGraph`]: arena owning the nodes; activation, propagation, subscriptions
//! - [`Behavior`]: activation-scoped reaction wired through an [`ActivationContext`]
//! - [`traversal`]: deterministic descendant and ancestor searches
//!
//! # Example
//!
//! ```rust
//! use scene_graph::{patch, ObjectState, SceneGraph, SceneNode};
//! use serde_json::json;
//!
//! let mut graph = SceneGraph::new();
//! let root = graph.insert(SceneNode::new("dashboard", "dash", ObjectState::new()));
//! let panel = graph
//!     .insert_child(root, SceneNode::new("panel", "panel-1", ObjectState::new()))
//!     .unwrap();
//!
//! graph.activate_subtree(root).unwrap();
//! graph.set_state(panel, patch([("title", json!("CPU"))])).unwrap();
//! assert_eq!(graph.state(panel).unwrap().get_str("title"), Some("CPU"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
mod behavior;
mod error;
mod graph;
mod id;
mod lifecycle;
mod node;
mod state;

/// Graph walks
pub mod traversal;

// Re-exports
pub use behavior::{ActivationContext, Behavior, FnBehavior, Teardown};
pub use error::{BehaviorError, SceneError};
pub use graph::{SceneGraph, SceneGraphConfig};
pub use id::{NodeId, NodeKey, SubscriptionId};
pub use lifecycle::{allowed_transitions, validate_transition, ActivationHandle, ActivationState};
pub use node::SceneNode;
pub use state::{
    patch, ChangedKeys, Listener, ObjectState, Outbox, SceneState, StateChange, StateContainer,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the scene graph
    pub use crate::traversal::{find_ancestor, find_by_key, find_object};
    pub use crate::{
        patch, ActivationContext, ActivationHandle, Behavior, BehaviorError, NodeId,
        ObjectState, SceneError, SceneGraph, SceneNode, Teardown,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
