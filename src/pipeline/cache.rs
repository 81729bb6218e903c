// Result cache
// Memoizes batch outcomes under an explicit key derived from the source collection

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::UNIX_EPOCH;

use crate::audio::{AudioSource, SourceData};
use crate::pipeline::batch::{BatchOutcome, BatchPipeline};

/// Hex SHA-256 identifying one ordered source collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type KeyFn = Arc<dyn Fn(&[AudioSource]) -> CacheKey + Send + Sync>;

fn hash_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Default key: source count, then per source its name, variant and content identity.
/// In-memory sources contribute length and content digest; on-disk sources
/// contribute path, current file length and modification time.
pub fn default_cache_key(sources: &[AudioSource]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update((sources.len() as u64).to_le_bytes());

    for source in sources {
        hash_bytes(&mut hasher, source.name().as_bytes());
        match source.data() {
            SourceData::InMemory(bytes) => {
                hasher.update(b"mem");
                hasher.update((bytes.len() as u64).to_le_bytes());
                hasher.update(Sha256::digest(bytes));
            }
            SourceData::OnDisk(path) => {
                hasher.update(b"disk");
                hash_bytes(&mut hasher, path.to_string_lossy().as_bytes());
                let metadata = std::fs::metadata(path).ok();
                let len = metadata.as_ref().map_or(u64::MAX, |m| m.len());
                hasher.update(len.to_le_bytes());
                // Unknown mtimes hash as zero so the key stays stable on such filesystems
                let modified_nanos = metadata
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_nanos());
                hasher.update(modified_nanos.to_le_bytes());
            }
        }
    }

    CacheKey(hex::encode(hasher.finalize()))
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub key: CacheKey,
    pub outcome: Arc<BatchOutcome>,
    /// True when the outcome was served without running the batch
    pub from_cache: bool,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Arc<BatchOutcome>>,
    insertion_order: VecDeque<CacheKey>,
}

/// Process-lifetime cache of batch outcomes.
/// Entries are never invalidated implicitly; `clear` empties it.
pub struct ResultCache {
    key_fn: KeyFn,
    capacity: Option<usize>,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Unbounded cache using `default_cache_key`
    pub fn new() -> Self {
        ResultCache {
            key_fn: Arc::new(default_cache_key),
            capacity: None,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Keep at most `capacity` entries, evicting the oldest insertion first
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    /// Replace the key function
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Key this cache would use for `sources`
    pub fn key_for(&self, sources: &[AudioSource]) -> CacheKey {
        (self.key_fn)(sources)
    }

    /// Run the pipeline for `sources` unless an outcome for the same key is cached
    pub fn get_or_compute(&self, sources: &[AudioSource], pipeline: &BatchPipeline) -> Arc<BatchOutcome> {
        self.get_or_compute_with(sources, |sources| pipeline.run(sources))
            .outcome
    }

    /// Like `get_or_compute` with a caller-supplied computation.
    /// The lock is not held while `compute` runs.
    pub fn get_or_compute_with<F>(&self, sources: &[AudioSource], compute: F) -> CacheLookup
    where
        F: FnOnce(&[AudioSource]) -> BatchOutcome,
    {
        let key = self.key_for(sources);

        if let Some(outcome) = self.lock().entries.get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Cache hit for {}", key);
            return CacheLookup {
                key,
                outcome,
                from_cache: true,
            };
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache miss for {}", key);
        let computed = Arc::new(compute(sources));

        let mut state = self.lock();
        // Another caller may have filled the slot meanwhile; keep the first entry
        let outcome = match state.entries.get(&key) {
            Some(existing) => Arc::clone(existing),
            None => {
                state.entries.insert(key.clone(), Arc::clone(&computed));
                state.insertion_order.push_back(key.clone());
                if let Some(capacity) = self.capacity {
                    while state.entries.len() > capacity {
                        match state.insertion_order.pop_front() {
                            Some(oldest) => {
                                state.entries.remove(&oldest);
                                log::debug!("Evicted cache entry {}", oldest);
                            }
                            None => break,
                        }
                    }
                }
                computed
            }
        };

        CacheLookup {
            key,
            outcome,
            from_cache: false,
        }
    }

    /// Number of cached outcomes
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an outcome is cached under `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.insertion_order.clear();
    }

    /// Lookups served from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that ran the computation
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        ResultCache::new()
    }
}
