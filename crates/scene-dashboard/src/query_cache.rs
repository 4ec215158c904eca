//! Query result cache using moka
//!
//! Results are keyed by a blake3 fingerprint of everything that determines a
//! panel's query: the panel key, its targets, the values of the variables
//! it references and the time range. A variable or time range edit therefore
//! produces a new key instead of requiring explicit invalidation.
//!
//! Each entry expires after the TTL of the panel's [`CachePolicy`]. Panels
//! without a policy are never cached.

use crate::behaviors::CachePolicy;
use moka::sync::Cache;
use moka::Expiry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fingerprint of one panel query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    /// Compute fingerprint
    #[must_use]
    pub fn compute(
        panel: &str,
        targets: &Value,
        variables: &BTreeMap<String, Value>,
        time_range: &Value,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        let mut part = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        part(panel.as_bytes());
        part(targets.to_string().as_bytes());
        for (name, value) in variables {
            part(name.as_bytes());
            part(value.to_string().as_bytes());
        }
        part(time_range.to_string().as_bytes());

        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    /// Hex digest
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    panel: Arc<str>,
    ttl: Duration,
    value: Arc<Value>,
}

struct PolicyExpiry;

impl Expiry<QueryKey, CachedResult> for PolicyExpiry {
    fn expire_after_create(
        &self,
        _key: &QueryKey,
        value: &CachedResult,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &QueryKey,
        value: &CachedResult,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache of panel query results
#[derive(Clone)]
pub struct QueryResultCache {
    inner: Cache<QueryKey, CachedResult>,
}

impl QueryResultCache {
    /// Create cache with max capacity
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PolicyExpiry)
                .build(),
        }
    }

    /// Store `value` if `policy` allows caching; returns whether it was stored
    pub fn insert(
        &self,
        key: QueryKey,
        panel: &str,
        policy: Option<CachePolicy>,
        value: Value,
    ) -> bool {
        let Some(ttl) = policy.and_then(|policy| policy.effective_ttl()) else {
            return false;
        };
        tracing::trace!(%key, panel, ttl_ms = ttl.as_millis(), "caching query result");
        self.inner.insert(
            key,
            CachedResult {
                panel: Arc::from(panel),
                ttl,
                value: Arc::new(value),
            },
        );
        true
    }

    /// Cached result, if present and not expired
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.inner.get(key).map(|entry| entry.value)
    }

    /// Check if a live entry exists
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.contains_key(key)
    }

    /// Drop every entry of `panel`; returns how many were dropped
    pub fn invalidate_panel(&self, panel: &str) -> usize {
        let stale: Vec<Arc<QueryKey>> = self
            .inner
            .iter()
            .filter(|(_, entry)| &*entry.panel == panel)
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.inner.invalidate(key.as_ref());
        }
        stale.len()
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get approximate entry count
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl Default for QueryResultCache {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl fmt::Debug for QueryResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResultCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(panel: &str, instance: &str) -> QueryKey {
        let variables = BTreeMap::from([("instance".to_string(), json!(instance))]);
        QueryKey::compute(
            panel,
            &json!([{"expr": "up{instance=\"$instance\"}"}]),
            &variables,
            &json!({"from": "now-1h", "to": "now"}),
        )
    }

    fn policy(ttl_ms: u64) -> Option<CachePolicy> {
        Some(CachePolicy {
            cache_timeout: None,
            ttl: Some(Duration::from_millis(ttl_ms)),
        })
    }

    #[test]
    fn fingerprint_depends_on_variables() {
        assert_eq!(key("panel-1", "a"), key("panel-1", "a"));
        assert_ne!(key("panel-1", "a"), key("panel-1", "b"));
        assert_ne!(key("panel-1", "a"), key("panel-2", "a"));
        assert_eq!(key("panel-1", "a").as_str().len(), 64);
    }

    #[test]
    fn stores_only_with_policy() {
        let cache = QueryResultCache::default();

        assert!(!cache.insert(key("panel-1", "a"), "panel-1", None, json!([1])));
        assert!(!cache.insert(key("panel-1", "a"), "panel-1", policy(0), json!([1])));
        assert!(cache.insert(key("panel-1", "a"), "panel-1", policy(60_000), json!([1])));

        assert_eq!(cache.get(&key("panel-1", "a")).as_deref(), Some(&json!([1])));
        assert!(cache.get(&key("panel-1", "b")).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = QueryResultCache::default();
        cache.insert(key("panel-1", "a"), "panel-1", policy(50), json!([1]));

        std::thread::sleep(Duration::from_millis(150));

        assert!(cache.get(&key("panel-1", "a")).is_none());
    }

    #[test]
    fn invalidate_panel_leaves_others() {
        let cache = QueryResultCache::default();
        cache.insert(key("panel-1", "a"), "panel-1", policy(60_000), json!(1));
        cache.insert(key("panel-1", "b"), "panel-1", policy(60_000), json!(2));
        cache.insert(key("panel-2", "a"), "panel-2", policy(60_000), json!(3));

        assert_eq!(cache.invalidate_panel("panel-1"), 2);

        assert!(!cache.contains(&key("panel-1", "a")));
        assert!(cache.contains(&key("panel-2", "a")));
        assert_eq!(cache.entry_count(), 1);
    }
}
