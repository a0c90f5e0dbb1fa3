use parking_lot::RwLock;
use std::collections::HashMap;

/// Read-through cache of issuer ids keyed by base64 authority key id.
///
/// Entries are added lazily and never invalidated: issuer rows are never
/// deleted, so a cached id stays correct for the life of the store. The lock
/// only guards the map. Two callers missing on the same key both go to the
/// database and the unique index decides which insert wins.
#[derive(Debug, Default)]
pub struct IssuerCache {
    ids: RwLock<HashMap<String, i64>>,
}

impl IssuerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, authority_key_id: &str) -> Option<i64> {
        self.ids.read().get(authority_key_id).copied()
    }

    pub fn insert(&self, authority_key_id: &str, issuer_id: i64) {
        self.ids
            .write()
            .insert(authority_key_id.to_string(), issuer_id);
    }

    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn miss_then_hit() {
        let cache = IssuerCache::new();
        assert_eq!(cache.get("a2V5"), None);
        cache.insert("a2V5", 7);
        assert_eq!(cache.get("a2V5"), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn shared_across_threads() {
        let cache = Arc::new(IssuerCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert(&format!("key-{}", i % 4), i % 4))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get("key-3"), Some(3));
    }
}
