//! Immutable node state and its container
//!
//! Every [`StateContainer::set_state`] call replaces the state with a freshly
//! allocated [`Arc`], so downstream consumers can detect change with
//! [`Arc::ptr_eq`] alone.

use crate::error::SceneError;
use crate::id::{NodeId, NodeKey, SubscriptionId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// State stored by a node
///
/// `merge` must never fail for a well-formed partial and must report every
/// top-level key whose value it changed.
pub trait SceneState: Clone + fmt::Debug + 'static {
    /// Partial update accepted by [`StateContainer::set_state`]
    type Partial;

    /// Shallow-merge `partial` onto `self`
    fn merge(&self, partial: Self::Partial) -> (Self, ChangedKeys);
}

/// Ordered set of top-level state keys touched by an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedKeys(BTreeSet<String>);

impl ChangedKeys {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a changed key
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>) {
        self.0.insert(key.into());
    }

    /// Check if key changed
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// Check if any of `keys` changed
    #[must_use]
    pub fn contains_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.contains(key))
    }

    /// Check if nothing changed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of changed keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate keys in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<K> for ChangedKeys {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// JSON-object state used by every node in a [`SceneGraph`](crate::SceneGraph)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectState(Map<String, Value>);

impl ObjectState {
    /// Create empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from a JSON value; non-object values yield `None`
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Get field
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get string field
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get unsigned integer field
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Check if field is present
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Underlying map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Clone into a JSON value
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for ObjectState {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl SceneState for ObjectState {
    type Partial = Map<String, Value>;

    fn merge(&self, partial: Self::Partial) -> (Self, ChangedKeys) {
        let mut next = self.0.clone();
        let mut changed = ChangedKeys::new();
        for (key, value) in partial {
            if next.get(&key) != Some(&value) {
                changed.insert(key.clone());
            }
            next.insert(key, value);
        }
        (Self(next), changed)
    }
}

/// Build a partial update from key/value pairs
///
/// ```
/// use scene_graph::patch;
/// use serde_json::json;
///
/// let partial = patch([("title", json!("CPU")), ("id", json!(1))]);
/// assert_eq!(partial.len(), 2);
/// ```
pub fn patch<I, K, V>(entries: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Notification delivered to subscribers after a state change
#[derive(Debug)]
pub struct StateChange<'a, S> {
    /// Key of the node that changed
    pub key: &'a NodeKey,
    /// New state snapshot
    pub state: &'a Arc<S>,
    /// Top-level keys that changed
    pub changed: &'a ChangedKeys,
}

/// Follow-up updates requested by subscribers
///
/// Subscribers never mutate the graph directly while a notification is being
/// delivered; they queue updates here and the graph applies them once the
/// current notification pass completes.
pub struct Outbox<S: SceneState> {
    queue: Vec<(NodeId, S::Partial)>,
}

impl<S: SceneState> Outbox<S> {
    /// Create empty outbox
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Queue a state update for `node`
    #[inline]
    pub fn set_state(&mut self, node: NodeId, partial: S::Partial) {
        self.queue.push((node, partial));
    }

    /// Number of queued updates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<(NodeId, S::Partial)> {
        std::mem::take(&mut self.queue)
    }
}

impl<S: SceneState> Default for Outbox<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SceneState> fmt::Debug for Outbox<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox").field("queued", &self.queue.len()).finish()
    }
}

/// State change listener
pub type Listener<S> = Box<dyn FnMut(&StateChange<'_, S>, &mut Outbox<S>)>;

/// Holder of one node's immutable state and its subscribers
pub struct StateContainer<S: SceneState> {
    key: NodeKey,
    state: Arc<S>,
    listeners: IndexMap<SubscriptionId, Listener<S>>,
    next_local_id: u64,
    destroyed: bool,
}

impl<S: SceneState> StateContainer<S> {
    /// Create container with initial state
    #[must_use]
    pub fn new(key: impl Into<NodeKey>, state: S) -> Self {
        Self {
            key: key.into(),
            state: Arc::new(state),
            listeners: IndexMap::new(),
            next_local_id: 0,
            destroyed: false,
        }
    }

    /// Stable key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.state)
    }

    /// Borrow current snapshot without bumping the refcount
    #[inline]
    #[must_use]
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Merge `partial` and notify subscribers in subscription order
    ///
    /// Subscribers are only invoked when at least one key changed.
    ///
    /// # Errors
    /// Returns [`SceneError::ContainerDestroyed`] after [`destroy`](Self::destroy)
    pub fn set_state(
        &mut self,
        partial: S::Partial,
        outbox: &mut Outbox<S>,
    ) -> Result<Arc<S>, SceneError> {
        if self.destroyed {
            return Err(SceneError::ContainerDestroyed(self.key.clone()));
        }

        let (next, changed) = self.state.merge(partial);
        self.state = Arc::new(next);

        if !changed.is_empty() {
            let change = StateChange {
                key: &self.key,
                state: &self.state,
                changed: &changed,
            };
            for listener in self.listeners.values_mut() {
                listener(&change, outbox);
            }
        }

        Ok(Arc::clone(&self.state))
    }

    /// Register a listener with a locally allocated id
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&StateChange<'_, S>, &mut Outbox<S>) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_local_id);
        self.next_local_id += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub(crate) fn insert_listener(&mut self, id: SubscriptionId, listener: Listener<S>) {
        self.listeners.insert(id, listener);
    }

    /// Remove listener; returns whether it was registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.shift_remove(&id).is_some()
    }

    /// Number of registered listeners
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drop all listeners and reject further updates
    pub fn destroy(&mut self) {
        self.listeners.clear();
        self.destroyed = true;
    }

    /// Check if container was destroyed
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl<S: SceneState> fmt::Debug for StateContainer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContainer")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("subscribers", &self.listeners.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
