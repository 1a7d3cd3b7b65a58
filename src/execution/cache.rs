//! Region cache.
//!
//! Keeps buffers computed for (node, output pad, rectangle) so a later
//! request covered by an earlier one skips the node and everything upstream.
//! Every entry records what it was computed from, so graph mutations drop
//! exactly the entries they affect.

use crate::core::buffer::Buffer;
use crate::core::error::{ConnectionId, NodeId};
use crate::core::rect::Rectangle;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of entries.
pub const DEFAULT_CAPACITY: usize = 256;

/// Default memory limit in megabytes.
pub const DEFAULT_MEMORY_LIMIT_MB: usize = 512;

/// A cache key: the rectangle produced on one output pad.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The node ID.
    pub node_id: NodeId,
    /// The output pad.
    pub pad: String,
    /// The rectangle the buffer covers.
    pub rect: Rectangle,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(node_id: NodeId, pad: impl Into<String>, rect: Rectangle) -> Self {
        Self {
            node_id,
            pad: pad.into(),
            rect,
        }
    }
}

/// Everything an entry was computed from.
///
/// The producing node itself, every node upstream of it, and every
/// connection on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub nodes: HashSet<NodeId>,
    pub connections: HashSet<ConnectionId>,
}

impl Dependencies {
    /// Dependencies of a node with no inputs.
    pub fn of(node_id: NodeId) -> Self {
        let mut deps = Self::default();
        deps.nodes.insert(node_id);
        deps
    }

    /// Fold in an upstream node's dependencies and the connection reaching it.
    pub fn absorb(&mut self, upstream: &Dependencies, via: ConnectionId) {
        self.nodes.extend(upstream.nodes.iter().copied());
        self.connections.extend(upstream.connections.iter().copied());
        self.connections.insert(via);
    }

    pub fn depends_on_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains(&node_id)
    }

    pub fn depends_on_connection(&self, id: ConnectionId) -> bool {
        self.connections.contains(&id)
    }
}

/// Cached buffer with what it was computed from.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached pixels.
    pub buffer: Buffer,
    /// Upstream nodes and connections.
    pub dependencies: Dependencies,
    /// Approximate memory size in bytes.
    pub memory_size: usize,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Number of entries evicted to stay within bounds.
    pub evictions: u64,
    /// Number of entries dropped because the graph changed.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    memory: usize,
    stats: CacheStats,
}

/// Thread-safe region cache.
pub struct RegionCache {
    state: Mutex<CacheState>,
    max_memory: usize,
}

impl RegionCache {
    /// Create a new cache with the given entry capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                memory: 0,
                stats: CacheStats::default(),
            }),
            max_memory: DEFAULT_MEMORY_LIMIT_MB * 1024 * 1024,
        }
    }

    /// Create a cache with custom memory limit.
    pub fn with_memory_limit(capacity: usize, max_memory_mb: usize) -> Self {
        let mut cache = Self::new(capacity);
        cache.max_memory = max_memory_mb * 1024 * 1024;
        cache
    }

    /// Find a buffer on `node_id.pad` covering `need`.
    ///
    /// The smallest covering entry wins. The returned buffer is a view onto
    /// the cached storage.
    pub fn lookup(&self, node_id: NodeId, pad: &str, need: &Rectangle) -> Option<Buffer> {
        let mut state = self.state.lock();
        let key = state
            .entries
            .iter()
            .filter(|(k, _)| k.node_id == node_id && k.pad == pad && k.rect.contains(need))
            .min_by_key(|(k, _)| k.rect.area())
            .map(|(k, _)| k.clone());

        let buffer = key
            .as_ref()
            .and_then(|k| state.entries.get(k))
            .map(|entry| entry.buffer.clone());

        match buffer {
            Some(buffer) => {
                state.stats.hits += 1;
                Some(buffer)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Whether some entry on `node_id.pad` covers `need`. Does not touch
    /// statistics or recency.
    pub fn covers(&self, node_id: NodeId, pad: &str, need: &Rectangle) -> bool {
        self.state
            .lock()
            .entries
            .iter()
            .any(|(k, _)| k.node_id == node_id && k.pad == pad && k.rect.contains(need))
    }

    /// Store a buffer.
    ///
    /// Least recently used entries are evicted until the memory limit holds.
    pub fn insert(&self, key: CacheKey, buffer: Buffer, dependencies: Dependencies) {
        let memory_size = buffer.memory_size();
        if memory_size > self.max_memory {
            log::warn!(
                "Not caching {} {} on {}: {} bytes exceeds the cache limit",
                key.node_id,
                key.pad,
                key.rect,
                memory_size
            );
            return;
        }

        let mut state = self.state.lock();
        if let Some(old) = state.entries.pop(&key) {
            state.memory = state.memory.saturating_sub(old.memory_size);
        }
        while state.memory + memory_size > self.max_memory {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.memory = state.memory.saturating_sub(evicted.memory_size);
                    state.stats.evictions += 1;
                }
                None => break,
            }
        }

        let entry = CacheEntry {
            buffer,
            dependencies,
            memory_size,
        };
        if let Some((_, evicted)) = state.entries.push(key.clone(), entry) {
            // push returns the displaced LRU entry when at capacity
            state.memory = state.memory.saturating_sub(evicted.memory_size);
            state.stats.evictions += 1;
        }
        state.memory += memory_size;
    }

    /// Drop every entry computed through `connection`.
    pub fn invalidate_connection(&self, connection: ConnectionId) -> usize {
        self.invalidate_where(|deps| deps.depends_on_connection(connection))
    }

    /// Drop every entry computed from `node_id`, including its own.
    pub fn invalidate_node(&self, node_id: NodeId) -> usize {
        self.invalidate_where(|deps| deps.depends_on_node(node_id))
    }

    fn invalidate_where(&self, predicate: impl Fn(&Dependencies) -> bool) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| predicate(&entry.dependencies))
            .map(|(k, _)| k.clone())
            .collect();

        let mut freed = 0;
        for key in &keys {
            if let Some(entry) = state.entries.pop(key) {
                freed += entry.memory_size;
            }
        }
        state.memory = state.memory.saturating_sub(freed);
        state.stats.invalidations += keys.len() as u64;
        if !keys.is_empty() {
            log::debug!("Invalidated {} cache entries", keys.len());
        }
        keys.len()
    }

    /// Keys of all entries, most recently used first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.state.lock().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Whether an entry with exactly this key exists.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.memory = 0;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    /// Get current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.state.lock().memory
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for RegionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RegionCache")
            .field("entries", &state.entries.len())
            .field("memory", &state.memory)
            .field("max_memory", &self.max_memory)
            .field("stats", &state.stats)
            .finish()
    }
}

/// A shared cache wrapped in Arc.
pub type SharedCache = Arc<RegionCache>;

/// Create a new shared cache.
pub fn new_shared_cache(capacity: usize) -> SharedCache {
    Arc::new(RegionCache::new(capacity))
}
