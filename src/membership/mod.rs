//! Visited-URL tracking for the crawler.
//!
//! A Bloom filter remembers every URL ever inserted in bounded memory, and an
//! exact LRU of the most recent entries answers the common "just saw it" case
//! without touching the filter. A Bloom false positive makes a new URL look
//! seen, so a small fraction of pages can be skipped; a seen URL is never
//! reported as new.

mod bloom;

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub use bloom::BloomFilter;

pub const DEFAULT_CAPACITY: usize = 100_000;
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;
pub const DEFAULT_RECENT_ENTRIES: usize = 4096;

#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    pub capacity: usize,
    pub false_positive_rate: f64,
    pub recent_entries: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            recent_entries: DEFAULT_RECENT_ENTRIES,
        }
    }
}

#[derive(Debug)]
struct State {
    bloom: BloomFilter,
    recent: LruCache<String, ()>,
}

#[derive(Debug)]
pub struct VisitedSet {
    state: Mutex<State>,
}

impl VisitedSet {
    pub fn new(config: TrackerConfig) -> Self {
        let recent = NonZeroUsize::new(config.recent_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(State {
                bloom: BloomFilter::with_capacity(config.capacity, config.false_positive_rate),
                recent: LruCache::new(recent),
            }),
        }
    }

    /// Records `key` and returns `true` if it had not been seen before.
    ///
    /// Check and insert happen under one lock, so two concurrent callers with
    /// the same key never both get `true`.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.recent.get(key).is_some() {
            return false;
        }
        if state.bloom.contains(key.as_bytes()) {
            state.recent.put(key.to_string(), ());
            return false;
        }
        state.bloom.insert(key.as_bytes());
        state.recent.put(key.to_string(), ());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.recent.contains(key) || state.bloom.contains(key.as_bytes())
    }

    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(guard) => guard.bloom.inserted(),
            Err(poisoned) => poisoned.into_inner().bloom.inserted(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_insert_reports_seen() {
        let seen = VisitedSet::default();
        assert!(seen.check_and_insert("http://example.com/a"));
        assert!(!seen.check_and_insert("http://example.com/a"));
        assert!(seen.check_and_insert("http://example.com/b"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn evicted_recent_entries_are_still_known() {
        let seen = VisitedSet::new(TrackerConfig {
            capacity: 1_000,
            false_positive_rate: 0.01,
            recent_entries: 2,
        });
        for key in ["a", "b", "c", "d"] {
            assert!(seen.check_and_insert(key));
        }
        assert!(!seen.check_and_insert("a"));
        assert!(seen.contains("b"));
    }

    #[test]
    fn concurrent_inserts_admit_each_key_once() {
        let seen = Arc::new(VisitedSet::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    (0..200)
                        .filter(|i| seen.check_and_insert(&format!("http://h/{i}")))
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 200);
    }
}
