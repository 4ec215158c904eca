//! Scene nodes
//!
//! A [`SceneNode`] bundles a [`StateContainer`], its tree links and the
//! behaviors it owns. Nodes are built detached and handed to a
//! [`SceneGraph`](crate::SceneGraph), which owns them from then on.

use crate::behavior::{ActivationContext, Behavior, FnBehavior, Teardown};
use crate::error::BehaviorError;
use crate::id::{NodeId, NodeKey, SubscriptionId};
use crate::lifecycle::ActivationState;
use crate::state::{ObjectState, StateContainer};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Resources created during one activation, released on deactivation
#[derive(Default)]
pub(crate) struct ActiveScope {
    pub(crate) subscriptions: SmallVec<[SubscriptionId; 4]>,
    pub(crate) teardowns: Vec<Teardown>,
}

/// Unit of the scene graph
pub struct SceneNode {
    kind: String,
    pub(crate) container: StateContainer<ObjectState>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) behaviors: Vec<Box<dyn Behavior>>,
    pub(crate) hooks: Vec<Box<dyn Behavior>>,
    pub(crate) activation: ActivationState,
    pub(crate) epoch: u64,
    pub(crate) scope: ActiveScope,
}

impl SceneNode {
    /// Create detached node
    #[must_use]
    pub fn new(kind: impl Into<String>, key: impl Into<NodeKey>, state: ObjectState) -> Self {
        Self {
            kind: kind.into(),
            container: StateContainer::new(key, state),
            parent: None,
            children: Vec::new(),
            behaviors: Vec::new(),
            hooks: Vec::new(),
            activation: ActivationState::Inactive,
            epoch: 0,
            scope: ActiveScope::default(),
        }
    }

    /// Attach behavior; behaviors activate in attachment order
    #[must_use]
    pub fn with_behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behaviors.push(Box::new(behavior));
        self
    }

    /// Attach boxed behavior
    #[must_use]
    pub fn with_boxed_behavior(mut self, behavior: Box<dyn Behavior>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Register the node's own activation hook; hooks run after behaviors
    #[must_use]
    pub fn with_activation_hook<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: FnMut(&mut ActivationContext<'_>) -> Result<Option<Teardown>, BehaviorError> + 'static,
    {
        self.hooks.push(Box::new(FnBehavior::new(name, hook)));
        self
    }

    /// Node kind, e.g. `panel` or `variable`
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Check node kind
    #[inline]
    #[must_use]
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Stable key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        self.container.key()
    }

    /// Current state snapshot
    #[inline]
    #[must_use]
    pub fn state(&self) -> &Arc<ObjectState> {
        self.container.state()
    }

    /// Parent, if attached
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in display order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Activation state
    #[inline]
    #[must_use]
    pub fn activation_state(&self) -> ActivationState {
        self.activation
    }

    /// Check if node is `Active`
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    /// Names of attached behaviors in attachment order
    pub fn behavior_names(&self) -> impl Iterator<Item = &str> {
        self.behaviors.iter().map(|b| b.name())
    }

    /// Number of listeners currently registered on this node's state
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.container.subscriber_count()
    }
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("kind", &self.kind)
            .field("key", self.key())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("behaviors", &self.behaviors.len())
            .field("activation", &self.activation)
            .finish_non_exhaustive()
    }
}
