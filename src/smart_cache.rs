// =============================================================================
// SmartCache — TTL-indexed key/value cache with age-based expiry
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A `(key -> (value, insertedAt))` mapping used to cache ticker prices,
/// order books, candles, and balances behind ExchangeClient. `get` evicts
/// stale entries lazily; `sweep` drops everything past `max_age` proactively
/// so a cache of rarely-read keys doesn't grow unbounded.
pub struct SmartCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for SmartCache<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> SmartCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value if present and not older than `max_age`; otherwise
    /// evicts it (if present) and returns `None`.
    pub fn get(&self, key: &K, max_age: Duration) -> Option<V> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if entry.inserted_at.elapsed() <= max_age {
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        self.entries.write().remove(key);
        None
    }

    /// Last-write-wins insert.
    pub fn set(&self, key: K, value: V) {
        self.entries.write().insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.write().remove(key);
    }

    /// Drops every entry older than `max_age`. Intended to run on a periodic
    /// tick so the cache doesn't retain entries for keys that are no longer
    /// being read (and therefore would never be evicted by `get`).
    pub fn sweep(&self, max_age: Duration) {
        self.entries
            .write()
            .retain(|_, entry| entry.inserted_at.elapsed() <= max_age);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn get_returns_value_within_max_age() {
        let cache: SmartCache<String, i32> = SmartCache::new();
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string(), Duration::from_secs(5)), Some(1));
    }

    #[test]
    fn get_evicts_expired_entry() {
        let cache: SmartCache<String, i32> = SmartCache::new();
        cache.set("a".to_string(), 1);
        sleep(Duration::from_millis(15));
        assert_eq!(cache.get(&"a".to_string(), Duration::from_millis(5)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn set_is_last_write_wins() {
        let cache: SmartCache<String, i32> = SmartCache::new();
        cache.set("a".to_string(), 1);
        cache.set("a".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string(), Duration::from_secs(5)), Some(2));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let cache: SmartCache<String, i32> = SmartCache::new();
        cache.set("old".to_string(), 1);
        sleep(Duration::from_millis(15));
        cache.set("fresh".to_string(), 2);
        cache.sweep(Duration::from_millis(10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"fresh".to_string(), Duration::from_secs(5)), Some(2));
    }
}
