//! Activation state machine
//!
//! `Inactive -> Activating -> Active -> Deactivating -> Inactive`.
//! `Activating -> Inactive` is the rollback edge taken when a behavior
//! fails mid-activation.

use crate::error::SceneError;
use crate::id::NodeId;

/// Activation state of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivationState {
    /// Initial state; no subscriptions are live
    #[default]
    Inactive,
    /// Behaviors and hooks are wiring subscriptions
    Activating,
    /// Fully wired
    Active,
    /// Subscriptions are being torn down
    Deactivating,
}

impl ActivationState {
    /// Check if state is `Active`
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if a transition is in progress
    #[inline]
    #[must_use]
    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::Activating | Self::Deactivating)
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ActivationState) -> &'static [ActivationState] {
    use ActivationState::*;
    match from {
        Inactive => &[Activating],
        Activating => &[Active, Inactive],
        Active => &[Deactivating],
        Deactivating => &[Inactive],
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns [`SceneError::IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: ActivationState, to: ActivationState) -> Result<(), SceneError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SceneError::illegal_transition(from, to))
    }
}

/// Proof that a node was activated, scoped to one activation epoch
///
/// Async work started during an activation should hold on to the handle and
/// check [`SceneGraph::is_current`](crate::SceneGraph::is_current) before
/// applying its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationHandle {
    node: NodeId,
    epoch: u64,
}

impl ActivationHandle {
    #[inline]
    pub(crate) fn new(node: NodeId, epoch: u64) -> Self {
        Self { node, epoch }
    }

    /// Activated node
    #[inline]
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Activation epoch
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
