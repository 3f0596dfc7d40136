//! Process-wide LRU cache of shared transports.
//!
//! Reads dominate this cache by orders of magnitude, so the design keeps
//! the common hit path under a reader lock only: LRU promotion happens on
//! one hit in ten (*lazy LRU*), and only then does the reader upgrade to
//! the writer lock. The lock is released between the read and the write,
//! so every structural assumption is re-verified after the upgrade.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use reqwest::Client;
use taskfetch_core::FetchError;

use crate::key::{build_transport, TransportKey, TransportRole};

/// Upper bound on cached transports.
pub const MAX_CACHED_TRANSPORTS: usize = 100;

/// Promote an entry to the LRU front only on every Nth hit, to keep the
/// hit path read-lock-only.
const PROMOTE_EVERY: u64 = 10;

/// How far from the LRU tail the eviction scan looks for a proxy-bearing
/// victim before falling back to the absolute LRU.
const EVICTION_SCAN_DEPTH: usize = 10;

struct TransportEntry {
    client: Client,
    /// Monotonic access counter; the low bits gate promotion. Counts the
    /// insertion as the first access.
    hits: AtomicU64,
}

struct CacheInner {
    entries: HashMap<TransportKey, Arc<TransportEntry>>,
    /// LRU order, front = most recently used. Always consistent with
    /// `entries`: same keys, no more, no fewer.
    order: VecDeque<TransportKey>,
}

/// Bounded LRU of shared transports keyed by network settings.
pub struct TransportCache {
    inner: RwLock<CacheInner>,
}

enum ReadOutcome {
    Hit(Client),
    Promote,
    Miss,
}

impl TransportCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// The process-wide instance shared by every fetcher that does not
    /// disable transport caching.
    pub fn global() -> &'static TransportCache {
        static CACHE: LazyLock<TransportCache> = LazyLock::new(TransportCache::new);
        &CACHE
    }

    /// Returns the shared transport for `key`, building and interning it on
    /// a miss. Concurrent misses on the same key race to insert; exactly
    /// one client is retained and the losers' clients are discarded.
    pub fn lookup_or_create(&self, key: &TransportKey) -> Result<Client, FetchError> {
        match self.try_read(key) {
            ReadOutcome::Hit(client) => return Ok(client),
            ReadOutcome::Promote => {
                if let Some(client) = self.promote(key) {
                    return Ok(client);
                }
                // Evicted between lock releases; create below.
            }
            ReadOutcome::Miss => {}
        }

        // The construction runs outside any lock to keep writer hold times
        // short.
        let client = build_transport(key, TransportRole::Shared)?;

        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.entries.get(key).cloned() {
            // Another thread inserted while we were building: keep the
            // cached client, drop ours.
            entry.hits.fetch_add(1, Ordering::Relaxed);
            Self::move_to_front(&mut inner.order, key);
            return Ok(entry.client.clone());
        }
        if inner.entries.len() >= MAX_CACHED_TRANSPORTS {
            Self::evict_one(&mut inner);
        }
        inner.order.push_front(key.clone());
        inner.entries.insert(
            key.clone(),
            Arc::new(TransportEntry {
                client: client.clone(),
                hits: AtomicU64::new(1),
            }),
        );
        Ok(client)
    }

    fn try_read(&self, key: &TransportKey) -> ReadOutcome {
        let inner = self.inner.read().unwrap();
        match inner.entries.get(key) {
            Some(entry) => {
                let hits = entry.hits.fetch_add(1, Ordering::Relaxed) + 1;
                if hits % PROMOTE_EVERY != 0 || inner.order.front() == Some(key) {
                    ReadOutcome::Hit(entry.client.clone())
                } else {
                    ReadOutcome::Promote
                }
            }
            None => ReadOutcome::Miss,
        }
    }

    fn promote(&self, key: &TransportKey) -> Option<Client> {
        let mut inner = self.inner.write().unwrap();
        // The reader lock was released before the writer was acquired;
        // re-verify the entry survived the gap.
        let client = inner.entries.get(key)?.client.clone();
        Self::move_to_front(&mut inner.order, key);
        Some(client)
    }

    fn move_to_front(order: &mut VecDeque<TransportKey>, key: &TransportKey) {
        if order.front() == Some(key) {
            return;
        }
        if let Some(pos) = order.iter().position(|k| k == key) {
            let _ = order.remove(pos);
            order.push_front(key.clone());
        }
    }

    /// Selects and removes a victim. Proxy pools are costlier per idle
    /// connection and typically lower volume, so the oldest proxy-bearing
    /// entry within the scan window goes first; otherwise the absolute LRU.
    /// Dropping the entry releases its idle connections once no fetcher
    /// still holds the client.
    fn evict_one(inner: &mut CacheInner) {
        let victim = inner
            .order
            .iter()
            .rev()
            .take(EVICTION_SCAN_DEPTH)
            .find(|k| k.proxy.is_proxied())
            .cloned()
            .or_else(|| inner.order.back().cloned());
        if let Some(key) = victim {
            inner.entries.remove(&key);
            if let Some(pos) = inner.order.iter().position(|k| *k == key) {
                let _ = inner.order.remove(pos);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &TransportKey) -> bool {
        self.inner.read().unwrap().entries.contains_key(key)
    }

    /// Total accesses recorded for `key` (insertion counts as the first).
    pub fn hits(&self, key: &TransportKey) -> u64 {
        self.inner
            .read()
            .unwrap()
            .entries
            .get(key)
            .map(|e| e.hits.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for TransportCache {
    fn default() -> Self {
        Self::new()
    }
}
