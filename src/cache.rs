//! A tiny most-recently-used cache.

/// Caches the three most recently used entries.
#[derive(Debug, Clone)]
pub struct Cache3<K, V> {
    store: [Option<(K, V)>; 3],
}

impl<K, V> Default for Cache3<K, V> {
    fn default() -> Cache3<K, V> {
        Cache3 {
            store: [None, None, None],
        }
    }
}

impl<K: PartialEq, V> Cache3<K, V> {
    pub fn new() -> Cache3<K, V> {
        Cache3::default()
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn find(&mut self, key: &K) -> Option<&V> {
        let index = self
            .store
            .iter()
            .position(|entry| matches!(entry, Some((k, _)) if k == key))?;
        self.store[..=index].rotate_right(1);
        self.store[0].as_ref().map(|(_, value)| value)
    }

    /// Inserts an entry as most recently used, evicting the least recently used one.
    pub fn put(&mut self, key: K, value: V) {
        self.store.rotate_right(1);
        self.store[0] = Some((key, value));
    }

    /// Returns the value for `key`, computing and inserting it if absent.
    pub fn get(&mut self, key: K, make: impl FnOnce() -> V) -> &V {
        if self.find(&key).is_none() {
            let value = make();
            self.put(key, value);
        }
        match &self.store[0] {
            Some((_, value)) => value,
            None => unreachable!("cache slot was just filled"),
        }
    }

    pub fn clear(&mut self) {
        self.store = [None, None, None];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = Cache3::new();
        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(3, "three");
        assert_eq!(cache.find(&1), Some(&"one"));
        cache.put(4, "four");
        assert_eq!(cache.find(&2), None, "2 was least recently used");
        assert_eq!(cache.find(&1), Some(&"one"));
        assert_eq!(cache.find(&3), Some(&"three"));
        assert_eq!(cache.find(&4), Some(&"four"));
    }

    #[test]
    fn get_computes_once() {
        let mut cache = Cache3::new();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get("k", || {
                calls += 1;
                42
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(*cache.get("k", || 0), 42);
    }
}
