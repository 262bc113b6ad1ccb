use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Bounded set of message ids that already produced a trigger action.
///
/// Keeps edit events and gateway replays from answering the same message
/// twice. Eviction is true LRU; the most recently inserted id always
/// survives and the size never exceeds the configured capacity.
pub struct ProcessedCache {
    cache: Arc<Mutex<LruCache<u64, ()>>>,
}

impl ProcessedCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(100).unwrap());
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn insert(&self, message_id: u64) {
        let mut cache = self.cache.lock().unwrap();
        cache.put(message_id, ());
    }

    pub fn contains(&self, message_id: u64) -> bool {
        let mut cache = self.cache.lock().unwrap();
        cache.get(&message_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().unwrap().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let cache = ProcessedCache::new(10);
        assert!(!cache.contains(1));

        cache.insert(1);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
    }

    #[test]
    fn test_size_stays_bounded() {
        let max = 16;
        let cache = ProcessedCache::new(max);

        for id in 0..(max as u64 + 1) {
            cache.insert(id);
        }

        assert!(cache.len() <= max);
        // The newest insertion must have survived the eviction.
        assert!(cache.contains(max as u64));
        // The oldest untouched id is the one that went.
        assert!(!cache.contains(0));
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let cache = ProcessedCache::new(2);
        cache.insert(1);
        cache.insert(2);

        // Touch 1 so 2 becomes the eviction candidate.
        assert!(cache.contains(1));
        cache.insert(3);

        assert!(cache.contains(1));
        assert!(cache.contains(3));
        assert!(!cache.contains(2));
    }
}
