// src/cache.rs
use crate::identifiers::DumpIdentifier;
use crate::locks;
use crate::model::SdResult;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Bounded cache of loaded analysis results
pub struct ResultCache {
    capacity: usize,
    cache: RwLock<HashMap<DumpIdentifier, Arc<SdResult>>>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &DumpIdentifier) -> Option<Arc<SdResult>> {
        locks::read(&self.cache).get(id).cloned()
    }

    pub fn insert(&self, id: DumpIdentifier, result: Arc<SdResult>) {
        if self.capacity == 0 {
            return;
        }
        let mut cache = locks::write(&self.cache);
        if cache.len() >= self.capacity
            && !cache.contains_key(&id)
            && let Some(key) = cache.keys().next().cloned()
        {
            cache.remove(&key);
        }
        cache.insert(id, result);
    }

    pub fn contains(&self, id: &DumpIdentifier) -> bool {
        locks::read(&self.cache).contains_key(id)
    }

    pub fn remove(&self, id: &DumpIdentifier) {
        locks::write(&self.cache).remove(id);
    }

    pub fn len(&self) -> usize {
        locks::read(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        locks::write(&self.cache).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(d: &str) -> DumpIdentifier {
        DumpIdentifier::from_parts("b", d).unwrap()
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = ResultCache::new(2);
        for d in ["a", "b", "c"] {
            cache.insert(id(d), Arc::new(SdResult::new(json!({ "d": d }))));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&id("c")));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ResultCache::new(4);
        cache.insert(id("a"), Arc::new(SdResult::new(json!({}))));
        cache.insert(id("b"), Arc::new(SdResult::new(json!({}))));
        cache.remove(&id("a"));
        assert!(cache.get(&id("a")).is_none());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = ResultCache::new(0);
        cache.insert(id("a"), Arc::new(SdResult::new(json!({}))));
        assert!(cache.is_empty());
    }
}
