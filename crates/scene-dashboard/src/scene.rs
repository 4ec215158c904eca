//! Dashboard scene: the composition root
//!
//! ```text
//! dashboard
//! ├── timeRange
//! ├── variables
//! │   └── variable*
//! └── body
//!     ├── panel*
//!     └── row*
//!         └── panel*
//! ```
//!
//! Activation is explicit. With `auto_activate_children` the whole tree
//! activates at once; otherwise containers activate and each panel waits for
//! [`DashboardScene::activate_panel`].

use crate::behaviors::{
    referenced_variables, CachePolicy, CachePolicyHandle, DashboardBehavior, COMPARE_TIME_RANGE,
    DATA_VERSION,
};
use crate::config::DashboardSceneOptions;
use crate::error::DashboardError;
use crate::kinds;
use crate::model::{
    flatten_layout, from_object, to_object, DashboardModel, LayoutItem, PanelModel,
    TemplatingModel, TimeRangeModel, VariableModel,
};
use crate::query_cache::{QueryKey, QueryResultCache};
use scene_graph::traversal::{find_all, find_object};
use scene_graph::{
    patch, ActivationHandle, NodeId, ObjectState, SceneError, SceneGraph, SceneNode,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Panel state keys written by behaviors; never persisted
const DERIVED_PANEL_KEYS: &[&str] = &[DATA_VERSION, COMPARE_TIME_RANGE];

/// Live dashboard
pub struct DashboardScene {
    graph: SceneGraph,
    root: NodeId,
    time_range: NodeId,
    variables: NodeId,
    body: NodeId,
    options: DashboardSceneOptions,
    policies: HashMap<String, CachePolicyHandle>,
    query_cache: QueryResultCache,
    next_panel_id: u64,
    next_position: usize,
}

impl DashboardScene {
    /// Build an inactive scene from dashboard JSON
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if `dashboard` is malformed
    pub fn from_json(
        dashboard: &Value,
        options: DashboardSceneOptions,
    ) -> Result<Self, DashboardError> {
        let model = DashboardModel::from_value(dashboard)?;
        let mut graph = SceneGraph::with_config(options.graph_config());

        let mut root_state = to_object(&DashboardModel {
            panels: Vec::new(),
            time: None,
            templating: None,
            ..model.clone()
        })?;
        root_state.remove("panels");
        let root_key = model.uid.clone().unwrap_or_else(|| kinds::DASHBOARD.to_string());
        let root = graph.insert(SceneNode::new(kinds::DASHBOARD, root_key, root_state.into()));

        let time = to_object(&model.time.clone().unwrap_or_default())?;
        let time_range =
            graph.insert_child(root, SceneNode::new(kinds::TIME_RANGE, "timeRange", time.into()))?;

        let templating = model.templating.clone().unwrap_or_default();
        let variables = graph.insert_child(
            root,
            SceneNode::new(kinds::VARIABLES, "variables", templating.extra.clone().into()),
        )?;
        for variable in &templating.list {
            graph.insert_child(
                variables,
                SceneNode::new(
                    kinds::VARIABLE,
                    format!("var-{}", variable.name),
                    to_object(variable)?.into(),
                ),
            )?;
        }

        let body = graph.insert_child(root, SceneNode::new(kinds::BODY, "body", ObjectState::new()))?;

        let mut scene = Self {
            graph,
            root,
            time_range,
            variables,
            body,
            options,
            policies: HashMap::new(),
            query_cache: QueryResultCache::new(options.query_cache_capacity),
            next_panel_id: 1,
            next_position: 0,
        };

        for item in model.layout() {
            match item {
                LayoutItem::Panel(panel) => {
                    scene.insert_panel(body, &panel)?;
                }
                LayoutItem::Row { row, panels } => {
                    let key = row.scene_key(scene.take_position());
                    scene.bump_panel_id(&row);
                    let row_id = scene
                        .graph
                        .insert_child(body, SceneNode::new(kinds::ROW, key, to_object(&row)?.into()))?;
                    for panel in &panels {
                        scene.insert_panel(row_id, panel)?;
                    }
                }
            }
        }

        tracing::debug!(
            dashboard = %scene.graph.key(root)?,
            panels = scene.policies.len(),
            variables = templating.list.len(),
            "built dashboard scene"
        );
        Ok(scene)
    }

    fn take_position(&mut self) -> usize {
        let position = self.next_position;
        self.next_position += 1;
        position
    }

    fn bump_panel_id(&mut self, panel: &PanelModel) {
        if let Some(id) = panel.id {
            self.next_panel_id = self.next_panel_id.max(id + 1);
        }
    }

    fn insert_panel(&mut self, parent: NodeId, panel: &PanelModel) -> Result<NodeId, DashboardError> {
        let key = panel.scene_key(self.take_position());
        if self.policies.contains_key(&key) {
            tracing::warn!(panel = %key, "duplicate panel key, lookups resolve to the first panel");
        }
        self.bump_panel_id(panel);

        let policy = CachePolicyHandle::new();
        let node = DashboardBehavior::panel_defaults(policy.clone())
            .into_iter()
            .fold(
                SceneNode::new(kinds::PANEL, key.clone(), to_object(panel)?.into()),
                |node, behavior| node.with_behavior(behavior),
            );
        let id = self.graph.insert_child(parent, node)?;
        self.policies.entry(key).or_insert(policy);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Activate the scene according to the child activation policy
    ///
    /// # Errors
    /// Returns [`DashboardError::Scene`] if a node fails to activate; nodes
    /// activated before it stay active
    pub fn activate(&mut self) -> Result<(), DashboardError> {
        self.graph.activate(self.root)?;
        self.graph.activate(self.time_range)?;
        self.graph.activate_subtree(self.variables)?;

        if self.options.auto_activate_children {
            self.graph.activate_subtree(self.body)?;
        } else {
            self.graph.activate(self.body)?;
            let rows: Vec<NodeId> = self.graph.children(self.body).to_vec();
            for row in rows {
                if self.graph.node(row).is_some_and(|n| n.is_kind(kinds::ROW)) {
                    self.graph.activate(row)?;
                }
            }
        }

        tracing::debug!(
            auto_activate_children = self.options.auto_activate_children,
            "activated dashboard scene"
        );
        Ok(())
    }

    /// Deactivate every node, children before parents
    ///
    /// # Errors
    /// Returns [`DashboardError::Scene`] if a node is mid-transition
    pub fn deactivate(&mut self) -> Result<(), DashboardError> {
        self.graph.deactivate_subtree(self.root)?;
        tracing::debug!("deactivated dashboard scene");
        Ok(())
    }

    /// Check if the scene root is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.graph.is_active(self.root)
    }

    /// Activate one panel, e.g. when it scrolls into view
    ///
    /// # Errors
    /// - [`DashboardError::PanelNotFound`] if no panel has `key`
    /// - [`DashboardError::Scene`] if the scene itself is inactive or a
    ///   behavior fails
    pub fn activate_panel(&mut self, key: &str) -> Result<ActivationHandle, DashboardError> {
        let panel = self.require_panel(key)?;
        if !self.is_active() {
            return Err(SceneError::NodeInactive(self.root).into());
        }
        if let Some(parent) = self.graph.parent(panel) {
            self.graph.activate(parent)?;
        }
        Ok(self.graph.activate(panel)?)
    }

    /// Deactivate one panel
    ///
    /// # Errors
    /// Returns [`DashboardError::PanelNotFound`] if no panel has `key`
    pub fn deactivate_panel(&mut self, key: &str) -> Result<(), DashboardError> {
        let panel = self.require_panel(key)?;
        Ok(self.graph.deactivate(panel)?)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Change the dashboard time range
    ///
    /// # Errors
    /// Returns [`DashboardError::Scene`] if propagation fails
    pub fn set_time_range(&mut self, from: &str, to: &str) -> Result<(), DashboardError> {
        self.graph
            .set_state(self.time_range, patch([("from", json!(from)), ("to", json!(to))]))?;
        Ok(())
    }

    /// Change the refresh interval
    ///
    /// # Errors
    /// Returns [`DashboardError::Scene`] if propagation fails
    pub fn set_refresh(&mut self, interval: &str) -> Result<(), DashboardError> {
        self.graph
            .set_state(self.root, patch([("refresh", json!(interval))]))?;
        Ok(())
    }

    /// Select a variable value
    ///
    /// A plain value is wrapped as `{"text": value, "value": value}`.
    ///
    /// # Errors
    /// - [`DashboardError::VariableNotFound`] if no variable is called `name`
    /// - [`DashboardError::Scene`] if propagation fails
    pub fn set_variable_value(&mut self, name: &str, value: Value) -> Result<(), DashboardError> {
        let variable = self
            .variable(name)
            .ok_or_else(|| DashboardError::VariableNotFound(name.to_string()))?;
        let current = if value.is_object() {
            value
        } else {
            json!({"text": value.clone(), "value": value})
        };
        self.graph.set_state(variable, patch([("current", current)]))?;
        Ok(())
    }

    /// Rename a panel
    ///
    /// # Errors
    /// - [`DashboardError::PanelNotFound`] if no panel has `key`
    /// - [`DashboardError::Scene`] if propagation fails
    pub fn set_panel_title(&mut self, key: &str, title: &str) -> Result<(), DashboardError> {
        let panel = self.require_panel(key)?;
        self.graph.set_state(panel, patch([("title", json!(title))]))?;
        Ok(())
    }

    /// Replace fields of a panel's state
    ///
    /// # Errors
    /// - [`DashboardError::PanelNotFound`] if no panel has `key`
    /// - [`DashboardError::Scene`] if propagation fails
    pub fn update_panel(
        &mut self,
        key: &str,
        partial: Map<String, Value>,
    ) -> Result<(), DashboardError> {
        let panel = self.require_panel(key)?;
        self.graph.set_state(panel, partial)?;
        Ok(())
    }

    /// Append a panel to the body and return its key
    ///
    /// Panels without an id get the next free one. Under the automatic policy
    /// the panel is activated right away when the scene is active.
    ///
    /// # Errors
    /// - [`DashboardError::InvalidModel`] if `panel` is malformed or a row
    /// - [`DashboardError::Scene`] if activation fails
    pub fn add_panel(&mut self, panel: &Value) -> Result<String, DashboardError> {
        let mut model = parse_new_panel(panel)?;
        if model.id.is_none() {
            model.id = Some(self.next_panel_id);
        }

        let id = self.insert_panel(self.body, &model)?;
        let key = self.graph.key(id)?.to_string();
        if self.options.auto_activate_children && self.is_active() {
            self.graph.activate(id)?;
        }
        tracing::debug!(panel = %key, "added panel");
        Ok(key)
    }

    /// Remove a panel, tearing down its subscriptions and cached results
    ///
    /// # Errors
    /// Returns [`DashboardError::PanelNotFound`] if no panel has `key`
    pub fn remove_panel(&mut self, key: &str) -> Result<(), DashboardError> {
        let panel = self.require_panel(key)?;
        self.graph.remove(panel)?;
        self.policies.remove(key);
        let dropped = self.query_cache.invalidate_panel(key);
        tracing::debug!(panel = key, cached_results = dropped, "removed panel");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Underlying graph
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Time range node
    #[inline]
    #[must_use]
    pub fn time_range(&self) -> NodeId {
        self.time_range
    }

    /// Options the scene was built with
    #[inline]
    #[must_use]
    pub fn options(&self) -> &DashboardSceneOptions {
        &self.options
    }

    /// Panel with `key`
    #[must_use]
    pub fn panel(&self, key: &str) -> Option<NodeId> {
        find_object(&self.graph, self.body, |node| {
            node.is_kind(kinds::PANEL) && node.key().as_str() == key
        })
    }

    fn require_panel(&self, key: &str) -> Result<NodeId, DashboardError> {
        self.panel(key)
            .ok_or_else(|| DashboardError::PanelNotFound(key.to_string()))
    }

    /// Variable called `name`
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<NodeId> {
        find_object(&self.graph, self.variables, |node| {
            node.is_kind(kinds::VARIABLE) && node.state().get_str("name") == Some(name)
        })
    }

    /// Panel keys in display order
    #[must_use]
    pub fn panel_keys(&self) -> Vec<String> {
        find_all(&self.graph, self.body, |node| node.is_kind(kinds::PANEL))
            .into_iter()
            .filter_map(|id| self.graph.key(id).ok().map(ToString::to_string))
            .collect()
    }

    /// Cache policy of an active panel
    #[must_use]
    pub fn cache_policy(&self, key: &str) -> Option<CachePolicy> {
        self.policies.get(key).and_then(CachePolicyHandle::get)
    }

    // ------------------------------------------------------------------
    // Query cache
    // ------------------------------------------------------------------

    /// Fingerprint of the panel's current query
    ///
    /// # Errors
    /// Returns [`DashboardError::PanelNotFound`] if no panel has `key`
    pub fn query_key(&self, key: &str) -> Result<QueryKey, DashboardError> {
        let state = self.graph.state(self.require_panel(key)?)?;

        let variables: BTreeMap<String, Value> = referenced_variables(&state)
            .into_iter()
            .filter_map(|name| {
                let node = self.variable(&name)?;
                let current = self.graph.state(node).ok()?.get("current").cloned()?;
                Some((name, current))
            })
            .collect();
        let time = self.graph.state(self.time_range)?;
        let range = json!({"from": time.get("from"), "to": time.get("to")});

        Ok(QueryKey::compute(
            key,
            state.get("targets").unwrap_or(&Value::Null),
            &variables,
            &range,
        ))
    }

    /// Store a query result for the panel's current query
    ///
    /// Returns `false` when the panel has no active cache policy.
    ///
    /// # Errors
    /// Returns [`DashboardError::PanelNotFound`] if no panel has `key`
    pub fn cache_query_result(&self, key: &str, result: Value) -> Result<bool, DashboardError> {
        let query = self.query_key(key)?;
        Ok(self
            .query_cache
            .insert(query, key, self.cache_policy(key), result))
    }

    /// Cached result for the panel's current query
    ///
    /// # Errors
    /// Returns [`DashboardError::PanelNotFound`] if no panel has `key`
    pub fn cached_query_result(&self, key: &str) -> Result<Option<Arc<Value>>, DashboardError> {
        Ok(self.query_cache.get(&self.query_key(key)?))
    }

    /// Query result cache
    #[inline]
    #[must_use]
    pub fn query_cache(&self) -> &QueryResultCache {
        &self.query_cache
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the live scene back into dashboard JSON
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if a node's state no longer
    /// matches the dashboard schema
    pub fn save_model(&self) -> Result<Value, DashboardError> {
        let mut dashboard: DashboardModel = from_object(self.graph.state(self.root)?.as_map())?;
        dashboard.time = Some(from_object::<TimeRangeModel>(
            self.graph.state(self.time_range)?.as_map(),
        )?);

        let list = self
            .graph
            .children(self.variables)
            .iter()
            .map(|id| from_object::<VariableModel>(self.graph.state(*id)?.as_map()))
            .collect::<Result<Vec<_>, _>>()?;
        dashboard.templating = Some(TemplatingModel {
            list,
            extra: self.graph.state(self.variables)?.as_map().clone(),
        });

        let mut items = Vec::new();
        for child in self.graph.children(self.body) {
            let Some(node) = self.graph.node(*child) else {
                continue;
            };
            if node.is_kind(kinds::ROW) {
                let panels = self
                    .graph
                    .children(*child)
                    .iter()
                    .map(|id| self.saved_panel(*id))
                    .collect::<Result<Vec<_>, _>>()?;
                items.push(LayoutItem::Row {
                    row: from_object(node.state().as_map())?,
                    panels,
                });
            } else {
                items.push(LayoutItem::Panel(self.saved_panel(*child)?));
            }
        }
        dashboard.panels = flatten_layout(items);

        dashboard.to_value()
    }

    fn saved_panel(&self, id: NodeId) -> Result<PanelModel, DashboardError> {
        let mut state = self.graph.state(id)?.as_map().clone();
        for key in DERIVED_PANEL_KEYS {
            state.remove(*key);
        }
        from_object(&state)
    }
}

fn parse_new_panel(value: &Value) -> Result<PanelModel, DashboardError> {
    let panel: PanelModel = serde_json::from_value(value.clone())?;
    if panel.is_row() {
        return Err(DashboardError::InvalidModel(serde::de::Error::custom(
            "rows cannot be added as panels",
        )));
    }
    Ok(panel)
}

impl fmt::Debug for DashboardScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardScene")
            .field("root", &self.root)
            .field("active", &self.is_active())
            .field("panels", &self.policies.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
