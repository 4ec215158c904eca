//! Error types for the scene graph
//!
//! Lifecycle misuse (touching destroyed nodes, illegal activation
//! transitions) fails fast. Traversal misses are not errors and are
//! reported as `None` by the [`traversal`](crate::traversal) functions.

use crate::id::{NodeId, NodeKey};
use crate::lifecycle::ActivationState;
use std::error::Error as StdError;

/// Main scene graph error type
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Handle refers to a node that has been destroyed
    #[error("node {0} has been destroyed")]
    NodeDestroyed(NodeId),

    /// State container was destroyed before the update
    #[error("state container '{0}' has been destroyed")]
    ContainerDestroyed(NodeKey),

    /// Operation requires an active node
    #[error("node {0} is not active")]
    NodeInactive(NodeId),

    /// Re-parenting would make a node its own ancestor
    #[error("attaching {child} under {parent} would create a cycle")]
    WouldCreateCycle {
        /// Requested parent
        parent: NodeId,
        /// Node being attached
        child: NodeId,
    },

    /// Activation state machine violation
    #[error("illegal activation transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: ActivationState,
        /// Requested state
        to: ActivationState,
    },

    /// A behavior or activation hook failed; the node was rolled back to inactive
    #[error("behavior '{behavior}' failed to activate on {node}: {source}")]
    BehaviorActivation {
        /// Host node
        node: NodeId,
        /// Behavior name
        behavior: String,
        /// Underlying failure
        #[source]
        source: BehaviorError,
    },

    /// Follow-up updates kept re-triggering each other
    #[error("state propagation from {origin} exceeded {limit} rounds")]
    PropagationLimit {
        /// Node whose update started the chain
        origin: NodeId,
        /// Configured round limit
        limit: usize,
    },
}

impl SceneError {
    /// Check if error indicates a composition bug rather than a runtime failure
    #[inline]
    #[must_use]
    pub fn is_lifecycle_misuse(&self) -> bool {
        matches!(
            self,
            Self::NodeDestroyed(_)
                | Self::ContainerDestroyed(_)
                | Self::NodeInactive(_)
                | Self::WouldCreateCycle { .. }
                | Self::IllegalTransition { .. }
        )
    }

    /// Create illegal transition error
    #[inline]
    #[must_use]
    pub fn illegal_transition(from: ActivationState, to: ActivationState) -> Self {
        Self::IllegalTransition { from, to }
    }
}

/// Failure raised by a [`Behavior`](crate::Behavior) during activation
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BehaviorError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl BehaviorError {
    /// Create error with message
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create error wrapping an underlying cause
    #[inline]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Error message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<SceneError> for BehaviorError {
    fn from(value: SceneError) -> Self {
        Self::with_source("scene graph operation failed", value)
    }
}
