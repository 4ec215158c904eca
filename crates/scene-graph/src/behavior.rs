//! Behaviors: non-visual attachments that react to their host's lifecycle
//!
//! A [`Behavior`] runs once per host activation. Everything it wires up goes
//! through the [`ActivationContext`], which is the only way to create
//! node-owned subscriptions; the graph tears them down when the host
//! deactivates.

use crate::error::{BehaviorError, SceneError};
use crate::graph::SceneGraph;
use crate::id::{NodeId, SubscriptionId};
use crate::node::SceneNode;
use crate::state::{ObjectState, Outbox, StateChange};
use crate::traversal;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Cleanup returned from [`Behavior::activate`], run when the host deactivates
pub type Teardown = Box<dyn FnOnce()>;

/// Reaction to host activation
pub trait Behavior {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Wire subscriptions for one activation of the host
    ///
    /// # Errors
    /// Any error aborts the host's activation; the graph rolls back whatever
    /// this and earlier behaviors already set up.
    fn activate(&mut self, ctx: &mut ActivationContext<'_>)
        -> Result<Option<Teardown>, BehaviorError>;
}

/// Behavior backed by a closure
///
/// Also used for a node's own activation hooks.
pub struct FnBehavior<F> {
    name: String,
    activate: F,
}

impl<F> FnBehavior<F>
where
    F: FnMut(&mut ActivationContext<'_>) -> Result<Option<Teardown>, BehaviorError>,
{
    /// Create named closure behavior
    #[inline]
    pub fn new(name: impl Into<String>, activate: F) -> Self {
        Self {
            name: name.into(),
            activate,
        }
    }
}

impl<F> Behavior for FnBehavior<F>
where
    F: FnMut(&mut ActivationContext<'_>) -> Result<Option<Teardown>, BehaviorError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(
        &mut self,
        ctx: &mut ActivationContext<'_>,
    ) -> Result<Option<Teardown>, BehaviorError> {
        (self.activate)(ctx)
    }
}

impl<F> fmt::Debug for FnBehavior<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBehavior").field("name", &self.name).finish()
    }
}

/// Handle given to behaviors while their host is `Activating`
pub struct ActivationContext<'g> {
    graph: &'g mut SceneGraph,
    host: NodeId,
    subscriptions: &'g mut Vec<SubscriptionId>,
    deferred: &'g mut Outbox<ObjectState>,
}

impl<'g> ActivationContext<'g> {
    pub(crate) fn new(
        graph: &'g mut SceneGraph,
        host: NodeId,
        subscriptions: &'g mut Vec<SubscriptionId>,
        deferred: &'g mut Outbox<ObjectState>,
    ) -> Self {
        Self {
            graph,
            host,
            subscriptions,
            deferred,
        }
    }

    /// Node being activated
    #[inline]
    #[must_use]
    pub fn host(&self) -> NodeId {
        self.host
    }

    /// Host node
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if the host handle is stale
    pub fn host_node(&self) -> Result<&SceneNode, SceneError> {
        self.graph
            .node(self.host)
            .ok_or(SceneError::NodeDestroyed(self.host))
    }

    /// Host state snapshot
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if the host handle is stale
    pub fn host_state(&self) -> Result<Arc<ObjectState>, SceneError> {
        self.graph.state(self.host)
    }

    /// Read-only view of the graph for traversal
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &SceneGraph {
        &*self.graph
    }

    /// Nearest strict ancestor of the host matching `predicate`
    pub fn find_ancestor<P>(&self, predicate: P) -> Option<NodeId>
    where
        P: Fn(&SceneNode) -> bool,
    {
        traversal::find_ancestor(&*self.graph, self.host, predicate)
    }

    /// Subscribe to `target`'s state for the lifetime of this activation
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if `target` is stale
    pub fn subscribe(
        &mut self,
        target: NodeId,
        listener: impl FnMut(&StateChange<'_, ObjectState>, &mut Outbox<ObjectState>) + 'static,
    ) -> Result<SubscriptionId, SceneError> {
        let id = self
            .graph
            .add_owned_listener(target, self.host, Box::new(listener))?;
        self.subscriptions.push(id);
        Ok(id)
    }

    /// Queue an update applied once the host is `Active`
    #[inline]
    pub fn defer_state(&mut self, node: NodeId, partial: Map<String, Value>) {
        self.deferred.set_state(node, partial);
    }

    /// Number of subscriptions created so far in this activation
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl fmt::Debug for ActivationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationContext")
            .field("host", &self.host)
            .field("subscriptions", &self.subscriptions.len())
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}
