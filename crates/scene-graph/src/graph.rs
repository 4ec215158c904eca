//! Arena-backed scene graph
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`].
//! Parent links are plain ids, so a child never keeps its parent alive and
//! a stale parent id simply resolves to nothing.
//!
//! All operations are synchronous and single-threaded. Listeners cannot reach
//! the graph while a notification is delivered; follow-up updates they queue
//! in the [`Outbox`] are applied breadth-first afterwards, bounded by
//! [`SceneGraphConfig::max_propagation_depth`].

use crate::behavior::{ActivationContext, Behavior, Teardown};
use crate::error::{BehaviorError, SceneError};
use crate::id::{NodeId, NodeKey, SubscriptionId};
use crate::lifecycle::{validate_transition, ActivationHandle, ActivationState};
use crate::node::{ActiveScope, SceneNode};
use crate::state::{Listener, ObjectState, Outbox, StateChange};
use crate::traversal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Graph configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneGraphConfig {
    /// Maximum rounds of follow-up updates triggered by a single `set_state`
    pub max_propagation_depth: usize,
}

impl SceneGraphConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With propagation depth limit
    #[inline]
    #[must_use]
    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth;
        self
    }
}

impl Default for SceneGraphConfig {
    fn default() -> Self {
        Self {
            max_propagation_depth: 32,
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<SceneNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Node(NodeId),
    External,
}

#[derive(Debug, Clone, Copy)]
struct SubscriptionRecord {
    target: NodeId,
    owner: Owner,
}

/// Tree of [`SceneNode`]s
pub struct SceneGraph {
    config: SceneGraphConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    subscriptions: HashMap<SubscriptionId, SubscriptionRecord>,
    next_subscription: u64,
    live: usize,
}

impl SceneGraph {
    /// Create empty graph with default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SceneGraphConfig::default())
    }

    /// Create empty graph with custom configuration
    #[must_use]
    pub fn with_config(config: SceneGraphConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            subscriptions: HashMap::new(),
            next_subscription: 0,
            live: 0,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SceneGraphConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Insert node as a new root
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, node: SceneNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Insert node as the last child of `parent`
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if `parent` is stale
    pub fn insert_child(&mut self, parent: NodeId, node: SceneNode) -> Result<NodeId, SceneError> {
        self.require(parent)?;
        let id = self.insert(node);
        self.attach(parent, id)?;
        Ok(id)
    }

    /// Make `child` the last child of `parent`, detaching it from its old parent
    ///
    /// # Errors
    /// - [`SceneError::NodeDestroyed`] if either handle is stale
    /// - [`SceneError::WouldCreateCycle`] if `child` is `parent` or one of its ancestors
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.require(parent)?;
        self.require(child)?;

        if parent == child || traversal::ancestors(self, parent).any(|id| id == child) {
            return Err(SceneError::WouldCreateCycle { parent, child });
        }

        self.unlink(child);
        self.require_mut(child)?.parent = Some(parent);
        self.require_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Detach `child` from its parent, leaving it as a root
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if `child` is stale
    pub fn detach(&mut self, child: NodeId) -> Result<(), SceneError> {
        self.require(child)?;
        self.unlink(child);
        Ok(())
    }

    /// Deactivate and destroy `node` and its whole subtree
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if `node` is stale
    pub fn remove(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.require(node)?;
        let subtree: Vec<NodeId> = traversal::descendants(self, node).collect();

        for id in subtree.iter().rev() {
            self.deactivate(*id)?;
        }

        self.unlink(node);
        for id in subtree {
            self.destroy(id);
        }
        Ok(())
    }

    fn unlink(&mut self, child: NodeId) {
        let old_parent = self.node_mut(child).and_then(|n| n.parent.take());
        if let Some(parent) = old_parent.and_then(|p| self.node_mut(p)) {
            parent.children.retain(|c| *c != child);
        }
    }

    fn destroy(&mut self, id: NodeId) {
        let stale: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, record)| record.target == id || record.owner == Owner::Node(id))
            .map(|(sub, _)| *sub)
            .collect();
        for sub in stale {
            self.unsubscribe(sub);
        }

        let Some(slot) = self.slots.get_mut(id.index() as usize) else {
            return;
        };
        if slot.generation != id.generation() {
            return;
        }
        if let Some(mut node) = slot.node.take() {
            node.container.destroy();
            tracing::debug!(node = %id, key = %node.key(), "destroyed node");
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.live -= 1;
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Node for handle, `None` if stale
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    fn require(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.node(id).ok_or(SceneError::NodeDestroyed(id))
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.node_mut(id).ok_or(SceneError::NodeDestroyed(id))
    }

    /// Check if handle refers to a live node
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if graph has no live nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate live nodes in arena order
    #[allow(clippy::cast_possible_truncation)]
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node
                .as_ref()
                .map(|node| (NodeId::new(index as u32, slot.generation), node))
        })
    }

    /// Iterate nodes without a parent
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes()
            .filter(|(_, node)| node.parent().is_none())
            .map(|(id, _)| id)
    }

    /// Key of node
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if `id` is stale
    pub fn key(&self, id: NodeId) -> Result<&NodeKey, SceneError> {
        Ok(self.require(id)?.key())
    }

    /// Current state snapshot; no side effects
    ///
    /// # Errors
    /// Returns [`SceneError::NodeDestroyed`] if `id` is stale
    pub fn state(&self, id: NodeId) -> Result<Arc<ObjectState>, SceneError> {
        Ok(Arc::clone(self.require(id)?.state()))
    }

    /// Parent of node; `None` for roots and stale handles
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(SceneNode::parent)
    }

    /// Children of node; empty for stale handles
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[][..], |node| node.children())
    }

    /// Activation state; `None` for stale handles
    #[must_use]
    pub fn activation_state(&self, id: NodeId) -> Option<ActivationState> {
        self.node(id).map(SceneNode::activation_state)
    }

    /// Check if node is `Active`
    #[must_use]
    pub fn is_active(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(SceneNode::is_active)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Shallow-merge `partial` into node state and propagate notifications
    ///
    /// # Errors
    /// - [`SceneError::NodeDestroyed`] if `id` is stale
    /// - [`SceneError::PropagationLimit`] if follow-up updates do not settle
    pub fn set_state(
        &mut self,
        id: NodeId,
        partial: Map<String, Value>,
    ) -> Result<Arc<ObjectState>, SceneError> {
        let mut outbox = Outbox::new();
        let snapshot = self
            .require_mut(id)?
            .container
            .set_state(partial, &mut outbox)?;
        self.drain(id, outbox)?;
        Ok(snapshot)
    }

    /// Apply update only if `handle` still belongs to the node's current activation
    ///
    /// Returns `Ok(false)` when the update was dropped as stale.
    ///
    /// # Errors
    /// Same as [`set_state`](Self::set_state)
    pub fn set_state_if_current(
        &mut self,
        handle: &ActivationHandle,
        partial: Map<String, Value>,
    ) -> Result<bool, SceneError> {
        if !self.is_current(handle) {
            tracing::warn!(
                node = %handle.node(),
                epoch = handle.epoch(),
                "dropping update from superseded activation"
            );
            return Ok(false);
        }
        self.set_state(handle.node(), partial)?;
        Ok(true)
    }

    fn drain(&mut self, origin: NodeId, mut outbox: Outbox<ObjectState>) -> Result<(), SceneError> {
        let limit = self.config.max_propagation_depth;
        let mut rounds = 0usize;

        while !outbox.is_empty() {
            rounds += 1;
            if rounds > limit {
                return Err(SceneError::PropagationLimit { origin, limit });
            }

            let mut next = Outbox::new();
            for (target, partial) in outbox.take() {
                match self.node_mut(target) {
                    Some(node) => {
                        node.container.set_state(partial, &mut next)?;
                    }
                    None => {
                        tracing::warn!(%target, "dropping follow-up update for destroyed node");
                    }
                }
            }
            tracing::trace!(%origin, round = rounds, queued = next.len(), "propagated follow-up updates");
            outbox = next;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to an active node's state from outside the graph
    ///
    /// The subscription is dropped automatically when the node deactivates.
    ///
    /// # Errors
    /// - [`SceneError::NodeDestroyed`] if `id` is stale
    /// - [`SceneError::NodeInactive`] if the node is not `Active`
    pub fn subscribe(
        &mut self,
        id: NodeId,
        listener: impl FnMut(&StateChange<'_, ObjectState>, &mut Outbox<ObjectState>) + 'static,
    ) -> Result<SubscriptionId, SceneError> {
        if !self.require(id)?.is_active() {
            return Err(SceneError::NodeInactive(id));
        }
        self.register(id, Owner::External, Box::new(listener))
    }

    pub(crate) fn add_owned_listener(
        &mut self,
        target: NodeId,
        owner: NodeId,
        listener: Listener<ObjectState>,
    ) -> Result<SubscriptionId, SceneError> {
        self.register(target, Owner::Node(owner), listener)
    }

    fn register(
        &mut self,
        target: NodeId,
        owner: Owner,
        listener: Listener<ObjectState>,
    ) -> Result<SubscriptionId, SceneError> {
        let id = SubscriptionId::new(self.next_subscription);
        self.require_mut(target)?
            .container
            .insert_listener(id, listener);
        self.next_subscription += 1;
        self.subscriptions
            .insert(id, SubscriptionRecord { target, owner });
        Ok(id)
    }

    /// Remove subscription; returns whether it was live
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(record) = self.subscriptions.remove(&id) else {
            return false;
        };
        self.node_mut(record.target)
            .is_some_and(|node| node.container.unsubscribe(id))
    }

    /// Number of live subscriptions in the graph
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of live subscriptions created by `node`'s activation
    #[must_use]
    pub fn subscriptions_owned_by(&self, node: NodeId) -> usize {
        self.subscriptions
            .values()
            .filter(|record| record.owner == Owner::Node(node))
            .count()
    }

    fn drop_external_subscriptions(&mut self, target: NodeId) {
        let external: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, record)| record.target == target && record.owner == Owner::External)
            .map(|(sub, _)| *sub)
            .collect();
        for sub in external {
            self.unsubscribe(sub);
        }
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Activate node: run behaviors then activation hooks, then flip to `Active`
    ///
    /// Activating an already active node returns its current handle. Children
    /// are not activated; see [`activate_subtree`](Self::activate_subtree).
    ///
    /// # Errors
    /// - [`SceneError::NodeDestroyed`] if `id` is stale
    /// - [`SceneError::IllegalTransition`] if the node is mid-transition
    /// - [`SceneError::BehaviorActivation`] if a behavior failed; the node is
    ///   back to `Inactive` with nothing left wired
    pub fn activate(&mut self, id: NodeId) -> Result<ActivationHandle, SceneError> {
        let node = self.require_mut(id)?;
        match node.activation {
            ActivationState::Active => return Ok(ActivationHandle::new(id, node.epoch)),
            ActivationState::Inactive => {}
            other => {
                return Err(SceneError::illegal_transition(
                    other,
                    ActivationState::Activating,
                ))
            }
        }

        validate_transition(node.activation, ActivationState::Activating)?;
        node.activation = ActivationState::Activating;
        node.epoch += 1;
        let epoch = node.epoch;
        let mut behaviors = std::mem::take(&mut node.behaviors);
        let mut hooks = std::mem::take(&mut node.hooks);

        let mut subscriptions = Vec::new();
        let mut teardowns = Vec::new();
        let mut deferred = Outbox::new();
        let outcome = {
            let mut ctx = ActivationContext::new(self, id, &mut subscriptions, &mut deferred);
            run_activation(
                behaviors.iter_mut().chain(hooks.iter_mut()),
                &mut ctx,
                &mut teardowns,
            )
        };

        let node = self.require_mut(id)?;
        node.behaviors = behaviors;
        node.hooks = hooks;

        if let Err((behavior, source)) = outcome {
            for sub in subscriptions.into_iter().rev() {
                self.unsubscribe(sub);
            }
            for teardown in teardowns.into_iter().rev() {
                teardown();
            }
            let node = self.require_mut(id)?;
            validate_transition(node.activation, ActivationState::Inactive)?;
            node.activation = ActivationState::Inactive;
            tracing::warn!(node = %id, %behavior, error = %source, "activation aborted");
            return Err(SceneError::BehaviorActivation {
                node: id,
                behavior,
                source,
            });
        }

        let node = self.require_mut(id)?;
        validate_transition(node.activation, ActivationState::Active)?;
        node.activation = ActivationState::Active;
        node.scope = ActiveScope {
            subscriptions: subscriptions.into_iter().collect(),
            teardowns,
        };
        tracing::debug!(node = %id, key = %node.key(), epoch, "activated node");

        self.drain(id, deferred)?;
        Ok(ActivationHandle::new(id, epoch))
    }

    /// Deactivate node, releasing everything its activation created
    ///
    /// Subscriptions are removed in reverse creation order, then behavior
    /// teardowns run in reverse, then external subscribers are dropped.
    /// Calling this on an inactive or destroyed node is a no-op.
    ///
    /// # Errors
    /// Returns [`SceneError::IllegalTransition`] if the node is mid-transition
    pub fn deactivate(&mut self, id: NodeId) -> Result<(), SceneError> {
        let Some(node) = self.node_mut(id) else {
            return Ok(());
        };
        match node.activation {
            ActivationState::Inactive => return Ok(()),
            ActivationState::Active => {}
            other => {
                return Err(SceneError::illegal_transition(
                    other,
                    ActivationState::Deactivating,
                ))
            }
        }

        node.activation = ActivationState::Deactivating;
        let scope = std::mem::take(&mut node.scope);

        for sub in scope.subscriptions.into_iter().rev() {
            self.unsubscribe(sub);
        }
        for teardown in scope.teardowns.into_iter().rev() {
            teardown();
        }
        self.drop_external_subscriptions(id);

        let node = self.require_mut(id)?;
        validate_transition(node.activation, ActivationState::Inactive)?;
        node.activation = ActivationState::Inactive;
        tracing::debug!(node = %id, key = %node.key(), "deactivated node");
        Ok(())
    }

    /// Check if `handle` belongs to the node's current activation
    #[must_use]
    pub fn is_current(&self, handle: &ActivationHandle) -> bool {
        self.node(handle.node())
            .is_some_and(|node| node.is_active() && node.epoch == handle.epoch())
    }

    /// Activate `root` and all descendants, parents before children
    ///
    /// # Errors
    /// Stops at the first failing node; nodes activated before it stay active
    pub fn activate_subtree(&mut self, root: NodeId) -> Result<Vec<ActivationHandle>, SceneError> {
        self.require(root)?;
        let order: Vec<NodeId> = traversal::descendants(self, root).collect();
        order.into_iter().map(|id| self.activate(id)).collect()
    }

    /// Deactivate `root` and all descendants, children before parents
    ///
    /// # Errors
    /// Returns [`SceneError::IllegalTransition`] if a node is mid-transition
    pub fn deactivate_subtree(&mut self, root: NodeId) -> Result<(), SceneError> {
        let order: Vec<NodeId> = traversal::descendants(self, root).collect();
        for id in order.into_iter().rev() {
            self.deactivate(id)?;
        }
        Ok(())
    }
}

fn run_activation<'b>(
    behaviors: impl Iterator<Item = &'b mut Box<dyn Behavior>>,
    ctx: &mut ActivationContext<'_>,
    teardowns: &mut Vec<Teardown>,
) -> Result<(), (String, BehaviorError)> {
    for behavior in behaviors {
        match behavior.activate(ctx) {
            Ok(Some(teardown)) => teardowns.push(teardown),
            Ok(None) => {}
            Err(err) => return Err((behavior.name().to_string(), err)),
        }
    }
    Ok(())
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.live)
            .field("subscriptions", &self.subscriptions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
