//! Bounded in-process image cache
//!
//! Maps an image reference (URL or storage path) to a decoded image handle.
//! The cache is shared by reference between the request path and any
//! observer that needs the current picture:
//! - Single `parking_lot::Mutex` guarding both the map and the eviction order
//! - Capacity-triggered eviction of exactly one entry per insert
//! - FIFO (insertion order) by default, LRU-on-access as an opt-in policy
//! - Metrics integration
//!
//! ```
//! use image_cache::ImageCache;
//!
//! let cache = ImageCache::new(2);
//! cache.set("a", 1);
//! cache.set("b", 2);
//! cache.set("c", 3);
//!
//! assert_eq!(cache.get("a"), None);
//! assert_eq!(cache.get("b"), Some(2));
//! assert_eq!(cache.get("c"), Some(3));
//! ```

mod metrics;

pub use metrics::CacheMetrics;

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default capacity when none is configured
pub const DEFAULT_MAX_CACHE_SIZE: usize = 100;

/// Which entry is evicted when an insert finds the cache full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Oldest insertion goes first. Overwriting a key keeps its position.
    #[default]
    Fifo,
    /// Least recently read or written goes first.
    Lru,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown eviction policy: {0} (expected \"fifo\" or \"lru\")")]
pub struct UnknownEvictionPolicy(String);

impl FromStr for EvictionPolicy {
    type Err = UnknownEvictionPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(EvictionPolicy::Fifo),
            "lru" => Ok(EvictionPolicy::Lru),
            other => Err(UnknownEvictionPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Fifo => write!(f, "fifo"),
            EvictionPolicy::Lru => write!(f, "lru"),
        }
    }
}

struct Entry<V> {
    value: V,
    seq: u64,
}

/// Map plus eviction order. Only ever touched with the cache lock held.
struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
    /// seq -> key, smallest seq is evicted first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn touch(&mut self, key: &str) {
        let seq = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.seq);
            entry.seq = seq;
            self.order.insert(seq, key.to_string());
        }
    }

    fn insert_new(&mut self, key: String, value: V) {
        let seq = self.bump();
        self.order.insert(seq, key.clone());
        self.entries.insert(key, Entry { value, seq });
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry.value)
    }
}

/// Thread-safe bounded cache keyed by image reference.
///
/// Values are handed out by clone, so `V` should be cheap to clone
/// (an `Arc` around the decoded image is the expected shape).
pub struct ImageCache<V> {
    state: Mutex<CacheState<V>>,
    max_size: usize,
    policy: EvictionPolicy,
    metrics: CacheMetrics,
}

impl<V: Clone> ImageCache<V> {
    /// Create a FIFO cache holding at most `max_size` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(max_size: usize) -> Self {
        Self::with_policy(max_size, EvictionPolicy::Fifo)
    }

    pub fn with_policy(max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            state: Mutex::new(CacheState::new()),
            max_size: max_size.max(1),
            policy,
            metrics: CacheMetrics::default(),
        }
    }

    /// Report this cache's hits, misses and evictions through `metrics`
    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Look up a handle by reference
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock();
        let value = state.entries.get(key).map(|e| e.value.clone());

        if value.is_some() && self.policy == EvictionPolicy::Lru {
            state.touch(key);
        }
        drop(state);

        match &value {
            Some(_) => {
                debug!(key = %key, "Image cache hit");
                self.metrics.record_hit();
            }
            None => {
                debug!(key = %key, "Image cache miss");
                self.metrics.record_miss();
            }
        }
        value
    }

    /// Insert or overwrite a handle.
    ///
    /// Inserting a new key into a full cache evicts exactly one entry first.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            if self.policy == EvictionPolicy::Lru {
                state.touch(&key);
            }
            return;
        }

        let evicted = if state.entries.len() >= self.max_size {
            state.evict_oldest()
        } else {
            None
        };
        state.insert_new(key, value);
        // Published under the lock so the gauge never lags a later writer
        self.metrics.set_entries(state.entries.len());
        drop(state);

        if let Some(evicted) = evicted {
            debug!(key = %evicted, "Image cache eviction");
            self.metrics.record_eviction();
        }
    }

    /// Drop a single entry, returning its handle if it was cached
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock();
        let removed = state.remove(key);
        self.metrics.set_entries(state.entries.len());
        removed
    }

    /// Drop every entry in one critical section
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        self.metrics.set_entries(0);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Keys from next-to-evict to most recently positioned
    pub fn keys_in_eviction_order(&self) -> Vec<String> {
        self.state.lock().order.values().cloned().collect()
    }
}

impl<V: Clone> Default for ImageCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_SIZE)
    }
}

impl<V> fmt::Debug for ImageCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("len", &self.state.lock().entries.len())
            .field("max_size", &self.max_size)
            .field("policy", &self.policy)
            .finish()
    }
}
