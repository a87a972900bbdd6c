//! Content-addressed embedding cache with single-flight computation.
//!
//! Lookups go through [`EmbeddingCache::get_or_compute`]. For a given
//! fingerprint at most one computation runs at a time; concurrent callers
//! for the same fingerprint wait on the in-flight computation and reuse its
//! result. Unrelated fingerprints never wait on each other: the state lock
//! is only held for map bookkeeping, never across a computation.
//!
//! A slot is published only once its vector is complete. If the computing
//! caller fails or is cancelled, nothing is stored and one of the waiters
//! (if any) takes over the computation.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::Embedding;
use crate::fingerprint::Fingerprint;

/// Default number of cached vectors.
pub const DEFAULT_CAPACITY: usize = 10_000;

type Flight = Arc<OnceCell<Arc<Embedding>>>;

/// Where a vector returned by the cache came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSource {
    /// Already cached.
    Cache,
    /// Computed by this caller.
    Computed,
    /// Computed by a concurrent caller this one waited for.
    Coalesced,
}

/// A vector handed out by the cache.
#[derive(Debug, Clone)]
pub struct CachedVector {
    /// The shared vector. Every caller for a fingerprint gets the same one.
    pub vector: Arc<Embedding>,

    /// Whether this was a hit, a fresh computation, or a coalesced wait.
    pub source: VectorSource,
}

struct CacheState {
    entries: LruCache<Fingerprint, Arc<Embedding>>,
    in_flight: HashMap<Fingerprint, Flight>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

/// Registration of one caller in a fingerprint's flight.
///
/// Dropping it, on completion, failure or cancellation alike, unregisters
/// the flight once nobody else can still run it.
struct FlightGuard<'a> {
    cache: &'a EmbeddingCache,
    fingerprint: Fingerprint,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.cache.state.lock();
        let registered = state
            .in_flight
            .get(&self.fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight));
        // The map and this guard hold two references; any more are waiters
        // that will take over the computation.
        if registered && (self.flight.initialized() || Arc::strong_count(&self.flight) <= 2) {
            state.in_flight.remove(&self.fingerprint);
        }
    }
}

/// Bounded LRU cache of embeddings keyed by [`Fingerprint`].
pub struct EmbeddingCache {
    state: Mutex<CacheState>,
    counters: Counters,
    capacity: NonZeroUsize,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` vectors. Zero is treated
    /// as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
            counters: Counters::default(),
            capacity,
        }
    }

    /// Return the cached vector for `fingerprint`, computing it with
    /// `compute` on a miss.
    ///
    /// `compute` is only invoked by the caller that ends up running the
    /// computation; everyone else racing on the same fingerprint waits for
    /// it. An error from `compute` is returned to that caller only and
    /// leaves no entry behind.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        fingerprint: Fingerprint,
        compute: F,
    ) -> Result<CachedVector, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Embedding, E>>,
    {
        let guard = {
            let mut state = self.state.lock();
            if let Some(vector) = state.entries.get(&fingerprint) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(CachedVector {
                    vector: Arc::clone(vector),
                    source: VectorSource::Cache,
                });
            }
            FlightGuard {
                cache: self,
                fingerprint,
                flight: Arc::clone(state.in_flight.entry(fingerprint).or_default()),
            }
        };
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let ran_here = AtomicBool::new(false);
        let outcome = guard
            .flight
            .get_or_try_init(|| {
                ran_here.store(true, Ordering::Relaxed);
                self.counters.computations.fetch_add(1, Ordering::Relaxed);
                async move { compute().await.map(Arc::new) }
            })
            .await
            .map(Arc::clone);

        match outcome {
            Ok(vector) => {
                {
                    let mut state = self.state.lock();
                    if !state.entries.contains(&fingerprint) {
                        self.publish(&mut state, fingerprint, Arc::clone(&vector));
                    }
                }

                let source = if ran_here.load(Ordering::Relaxed) {
                    VectorSource::Computed
                } else {
                    VectorSource::Coalesced
                };
                Ok(CachedVector { vector, source })
            }
            Err(err) => {
                debug!("Embedding computation for {fingerprint:?} failed; nothing cached");
                Err(err)
            }
        }
    }

    fn publish(&self, state: &mut CacheState, fingerprint: Fingerprint, vector: Arc<Embedding>) {
        if let Some((evicted, _)) = state.entries.push(fingerprint, vector) {
            if evicted != fingerprint {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Evicted {evicted:?} from embedding cache");
            }
        }
    }

    /// Look up a vector without computing it.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Embedding>> {
        self.state.lock().entries.get(fingerprint).cloned()
    }

    /// Check if a vector is cached. Does not touch recency.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.state.lock().entries.contains(fingerprint)
    }

    /// Remove a cached vector.
    pub fn remove(&self, fingerprint: &Fingerprint) -> Option<Arc<Embedding>> {
        self.state.lock().entries.pop(fingerprint)
    }

    /// Number of cached vectors.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached vectors.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Drop every cached vector. In-flight computations are unaffected.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            capacity: self.capacity.get(),
            in_flight: state.in_flight.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub capacity: usize,

    /// Fingerprints with a computation registered.
    pub in_flight: usize,

    /// Lookups served from cache.
    pub hits: u64,

    /// Lookups that had to compute or wait.
    pub misses: u64,

    /// Times a compute function was invoked.
    pub computations: u64,

    /// Entries dropped to stay within capacity.
    pub evictions: u64,
}
