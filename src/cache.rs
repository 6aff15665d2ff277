//! Reconciliation hook keeping an external read-through cache consistent with
//! engine mutations. The engine never depends on this being wired; the no-op
//! implementation is always safe.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Side effects the lane applies to a read cache. All operations are keyed
/// (remove-by-id, patch-by-id) so they commute with concurrent refetches;
/// none may be a blind overwrite of a whole domain.
pub trait CacheReconciler: Send + Sync {
    /// Drop the record `(domain, id)` if present. Idempotent.
    fn optimistic_remove(&self, domain: &str, id: &str);

    /// Merge `patch` into the record `(domain, id)` if present. Unknown ids
    /// are ignored rather than inserted.
    fn optimistic_patch(&self, domain: &str, id: &str, patch: &Value);

    /// Mark every cached view of `domain` stale so observers refetch.
    fn invalidate(&self, domain: &str);
}

/// Default hook: does nothing.
#[derive(Debug, Default)]
pub struct NoopCache;

impl CacheReconciler for NoopCache {
    fn optimistic_remove(&self, _domain: &str, _id: &str) {}
    fn optimistic_patch(&self, _domain: &str, _id: &str, _patch: &Value) {}
    fn invalidate(&self, _domain: &str) {}
}

/// In-memory cache keyed by domain then record id. Used by the demo binary
/// and tests; a real deployment adapts its own cache behind the trait.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, HashMap<String, Value>>>,
    invalidations: Mutex<Vec<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, domain: &str, id: &str, value: Value) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .entry(domain.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }

    pub fn get(&self, domain: &str, id: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(domain).and_then(|d| d.get(id)).cloned()
    }

    pub fn len(&self, domain: &str) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(domain).map(|d| d.len()).unwrap_or(0)
    }

    /// Domains invalidated so far, in invalidation order.
    pub fn invalidated(&self) -> Vec<String> {
        self.invalidations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl CacheReconciler for MemoryCache {
    fn optimistic_remove(&self, domain: &str, id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(records) = entries.get_mut(domain) {
            records.remove(id);
        }
    }

    fn optimistic_patch(&self, domain: &str, id: &str, patch: &Value) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let record = match entries.get_mut(domain).and_then(|d| d.get_mut(id)) {
            Some(r) => r,
            None => return,
        };
        match (record.as_object_mut(), patch.as_object()) {
            (Some(target), Some(fields)) => {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            // Non-object records are replaced wholesale; still keyed by id.
            _ => *record = patch.clone(),
        }
    }

    fn invalidate(&self, domain: &str) {
        self.invalidations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(domain.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remove_is_idempotent() {
        let cache = MemoryCache::new();
        cache.insert("expenses", "42", json!({"amount": 10.0}));

        cache.optimistic_remove("expenses", "42");
        assert!(cache.get("expenses", "42").is_none());

        // A second remove of the same id is a no-op, not an error.
        cache.optimistic_remove("expenses", "42");
        assert!(cache.get("expenses", "42").is_none());
        assert_eq!(cache.len("expenses"), 0);
    }

    #[test]
    fn patch_merges_fields_by_id() {
        let cache = MemoryCache::new();
        cache.insert("contacts", "7", json!({"name": "Ana", "status": "pending"}));

        cache.optimistic_patch("contacts", "7", &json!({"status": "sent"}));
        assert_eq!(
            cache.get("contacts", "7"),
            Some(json!({"name": "Ana", "status": "sent"}))
        );
    }

    #[test]
    fn patch_of_unknown_id_is_ignored() {
        let cache = MemoryCache::new();
        cache.optimistic_patch("contacts", "missing", &json!({"status": "sent"}));
        assert!(cache.get("contacts", "missing").is_none());
    }

    #[test]
    fn invalidations_are_recorded_in_order() {
        let cache = MemoryCache::new();
        cache.invalidate("categories");
        cache.invalidate("products");
        assert_eq!(cache.invalidated(), vec!["categories", "products"]);
    }
}
