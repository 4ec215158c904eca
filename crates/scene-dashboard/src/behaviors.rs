//! Panel behaviors
//!
//! The set of behaviors is closed: every panel gets the three variants of
//! [`DashboardBehavior`], each of which does nothing when the panel state
//! gives it no reason to.

use crate::kinds;
use scene_graph::traversal;
use scene_graph::{
    patch, ActivationContext, Behavior, BehaviorError, NodeId, ObjectState, SceneGraph, Teardown,
};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::LazyLock;
use std::time::Duration;

const CACHE_TIMEOUT: &str = "cacheTimeout";
const QUERY_CACHING_TTL: &str = "queryCachingTTL";
pub(crate) const DATA_VERSION: &str = "dataVersion";
const COMPARE_WITH: &str = "compareWith";
pub(crate) const COMPARE_TIME_RANGE: &str = "compareTimeRange";

// ----------------------------------------------------------------------
// Query caching
// ----------------------------------------------------------------------

/// Caching settings of one panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// `cacheTimeout`, sent to the datasource
    pub cache_timeout: Option<Duration>,
    /// `queryCachingTTL`, honoured by the query cache
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    /// Read policy from panel state; `None` when neither field is set
    #[must_use]
    pub fn from_state(state: &ObjectState) -> Option<Self> {
        let cache_timeout = state.get(CACHE_TIMEOUT).and_then(parse_cache_timeout);
        let ttl = state
            .get(QUERY_CACHING_TTL)
            .and_then(Value::as_u64)
            .map(Duration::from_millis);

        (cache_timeout.is_some() || ttl.is_some()).then_some(Self { cache_timeout, ttl })
    }

    /// Lifetime of a cached result; `queryCachingTTL` wins over `cacheTimeout`
    #[must_use]
    pub fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.or(self.cache_timeout).filter(|ttl| !ttl.is_zero())
    }
}

/// Parse `cacheTimeout`: plain seconds (`60`, `"60"`) or a duration (`"90s"`, `"5m"`, `"1h"`, `"1d"`)
#[must_use]
pub fn parse_cache_timeout(value: &Value) -> Option<Duration> {
    if let Some(seconds) = value.as_u64() {
        return Some(Duration::from_secs(seconds));
    }

    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(seconds) = text.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let unit_at = text.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = text.split_at(unit_at);
    let amount: u64 = amount.parse().ok()?;
    let seconds = match unit {
        "ms" => return Some(Duration::from_millis(amount)),
        "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(3_600)?,
        "d" => amount.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

/// Shared view of a panel's cache policy
///
/// Holds a policy only while the panel is active.
#[derive(Debug, Clone, Default)]
pub struct CachePolicyHandle(Rc<RefCell<Option<CachePolicy>>>);

impl CachePolicyHandle {
    /// Create empty handle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current policy
    #[must_use]
    pub fn get(&self) -> Option<CachePolicy> {
        *self.0.borrow()
    }

    fn set(&self, policy: Option<CachePolicy>) {
        *self.0.borrow_mut() = policy;
    }
}

/// Exposes `cacheTimeout` / `queryCachingTTL` of the host panel
#[derive(Debug, Clone, Default)]
pub struct QueryCaching {
    policy: CachePolicyHandle,
}

impl QueryCaching {
    /// Create behavior publishing into `policy`
    #[must_use]
    pub fn new(policy: CachePolicyHandle) -> Self {
        Self { policy }
    }

    /// Policy handle
    #[must_use]
    pub fn policy(&self) -> &CachePolicyHandle {
        &self.policy
    }
}

impl Behavior for QueryCaching {
    fn name(&self) -> &str {
        "query-caching"
    }

    fn activate(
        &mut self,
        ctx: &mut ActivationContext<'_>,
    ) -> Result<Option<Teardown>, BehaviorError> {
        let host = ctx.host();
        self.policy.set(CachePolicy::from_state(&*ctx.host_state()?));

        let policy = self.policy.clone();
        ctx.subscribe(host, move |change, _| {
            if change.changed.contains_any(&[CACHE_TIMEOUT, QUERY_CACHING_TTL]) {
                policy.set(CachePolicy::from_state(change.state));
                tracing::debug!(panel = %change.key, policy = ?policy.get(), "cache policy updated");
            }
        })?;

        let policy = self.policy.clone();
        Ok(Some(Box::new(move || policy.set(None))))
    }
}

// ----------------------------------------------------------------------
// Variable dependency
// ----------------------------------------------------------------------

/// `${name}` with optional field path and format, `[[name]]` with optional
/// format, or bare `$name`
static VARIABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\{([A-Za-z0-9_]+)(?:\.[^:}]+)?(?::[^}]+)?\}|\[\[([A-Za-z0-9_]+?)(?::[A-Za-z0-9_]+)?\]\]|\$([A-Za-z0-9_]+)",
    )
    .expect("variable reference pattern is valid")
});

/// Names of variables referenced by the panel's query targets
///
/// Recognizes `$name`, `${name}`, `${name:format}`, `${name.field.path}`,
/// `[[name]]` and `[[name:format]]`.
#[must_use]
pub fn referenced_variables(state: &ObjectState) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if let Some(targets) = state.get("targets") {
        collect_references(targets, &mut names);
    }
    names
}

fn collect_references(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => {
            for captures in VARIABLE_REFERENCE.captures_iter(text) {
                if let Some(name) = captures.iter().skip(1).flatten().next() {
                    names.insert(name.as_str().to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, names)),
        Value::Object(map) => map.values().for_each(|item| collect_references(item, names)),
        _ => {}
    }
}

/// Bumps the panel's `dataVersion` when a referenced variable's value changes
///
/// References are resolved once per activation.
#[derive(Debug, Clone, Default)]
pub struct VariableDependency {
    resolved: Rc<RefCell<Vec<String>>>,
}

impl VariableDependency {
    /// Create behavior
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables wired during the current activation
    #[must_use]
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.borrow().clone()
    }
}

fn variable_nodes(graph: &SceneGraph, from: NodeId, names: &BTreeSet<String>) -> Vec<NodeId> {
    let root = traversal::root_of(graph, from).unwrap_or(from);
    traversal::find_all(graph, root, |node| {
        node.is_kind(kinds::VARIABLE)
            && node
                .state()
                .get_str("name")
                .is_some_and(|name| names.contains(name))
    })
}

impl Behavior for VariableDependency {
    fn name(&self) -> &str {
        "variable-dependency"
    }

    fn activate(
        &mut self,
        ctx: &mut ActivationContext<'_>,
    ) -> Result<Option<Teardown>, BehaviorError> {
        let host = ctx.host();
        let state = ctx.host_state()?;
        let names = referenced_variables(&state);
        if names.is_empty() {
            return Ok(None);
        }

        let targets = variable_nodes(ctx.graph(), host, &names);
        let version = Rc::new(Cell::new(state.get_u64(DATA_VERSION).unwrap_or(0)));
        let mut resolved = Vec::with_capacity(targets.len());

        for target in targets {
            if let Some(name) = ctx.graph().state(target)?.get_str("name") {
                resolved.push(name.to_string());
            }
            let version = Rc::clone(&version);
            ctx.subscribe(target, move |change, outbox| {
                if change.changed.contains_any(&["current", "filters"]) {
                    version.set(version.get() + 1);
                    tracing::debug!(variable = %change.key, panel = %host, version = version.get(), "variable changed, refreshing panel");
                    outbox.set_state(host, patch([(DATA_VERSION, json!(version.get()))]));
                }
            })?;
        }

        *self.resolved.borrow_mut() = resolved;
        let resolved = Rc::clone(&self.resolved);
        Ok(Some(Box::new(move || resolved.borrow_mut().clear())))
    }
}

// ----------------------------------------------------------------------
// Time compare
// ----------------------------------------------------------------------

/// Time range node in scope of `node`: a `timeRange` child of its nearest ancestor that has one
#[must_use]
pub fn nearest_time_range(graph: &SceneGraph, node: NodeId) -> Option<NodeId> {
    traversal::ancestors(graph, node).find_map(|ancestor| {
        graph
            .children(ancestor)
            .iter()
            .copied()
            .find(|child| graph.node(*child).is_some_and(|n| n.is_kind(kinds::TIME_RANGE)))
    })
}

fn compare_range(time_range: &ObjectState, offset: &str) -> Map<String, Value> {
    patch([(
        COMPARE_TIME_RANGE,
        json!({
            "from": time_range.get("from").cloned().unwrap_or(Value::Null),
            "to": time_range.get("to").cloned().unwrap_or(Value::Null),
            "offset": offset,
        }),
    )])
}

/// Mirrors the scene time range into `compareTimeRange` when `compareWith` is set
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeCompare;

impl Behavior for TimeCompare {
    fn name(&self) -> &str {
        "time-compare"
    }

    fn activate(
        &mut self,
        ctx: &mut ActivationContext<'_>,
    ) -> Result<Option<Teardown>, BehaviorError> {
        let host = ctx.host();
        let Some(offset) = ctx.host_state()?.get_str(COMPARE_WITH).map(str::to_string) else {
            return Ok(None);
        };
        let time_range = nearest_time_range(ctx.graph(), host)
            .ok_or_else(|| BehaviorError::new("time comparison requires a time range in scope"))?;

        let current = ctx.graph().state(time_range)?;
        ctx.defer_state(host, compare_range(&current, &offset));
        ctx.subscribe(time_range, move |change, outbox| {
            if change.changed.contains_any(&["from", "to"]) {
                outbox.set_state(host, compare_range(change.state, &offset));
            }
        })?;
        Ok(None)
    }
}

// ----------------------------------------------------------------------
// Closed set
// ----------------------------------------------------------------------

/// Behaviors a dashboard panel can carry
#[derive(Debug, Clone)]
pub enum DashboardBehavior {
    /// See [`QueryCaching`]
    QueryCaching(QueryCaching),
    /// See [`VariableDependency`]
    VariableDependency(VariableDependency),
    /// See [`TimeCompare`]
    TimeCompare(TimeCompare),
}

impl DashboardBehavior {
    /// Standard panel behaviors, publishing the cache policy into `policy`
    #[must_use]
    pub fn panel_defaults(policy: CachePolicyHandle) -> [Self; 3] {
        [
            Self::QueryCaching(QueryCaching::new(policy)),
            Self::VariableDependency(VariableDependency::new()),
            Self::TimeCompare(TimeCompare),
        ]
    }
}

impl Behavior for DashboardBehavior {
    fn name(&self) -> &str {
        match self {
            Self::QueryCaching(inner) => inner.name(),
            Self::VariableDependency(inner) => inner.name(),
            Self::TimeCompare(inner) => inner.name(),
        }
    }

    fn activate(
        &mut self,
        ctx: &mut ActivationContext<'_>,
    ) -> Result<Option<Teardown>, BehaviorError> {
        match self {
            Self::QueryCaching(inner) => inner.activate(ctx),
            Self::VariableDependency(inner) => inner.activate(ctx),
            Self::TimeCompare(inner) => inner.activate(ctx),
        }
    }
}
