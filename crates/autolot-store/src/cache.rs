//! Page cache in front of a record store.
//!
//! Entries are keyed by the full query signature (filters, sort, page and
//! size), are dropped on every write made through the wrapper and expire
//! after a TTL so writes made by other processes become visible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use autolot_core::{CatalogQuery, PageResult, Record};

use crate::error::StoreResult;
use crate::records::RecordStore;

/// Cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            ttl: Duration::from_secs(30),
        }
    }
}

struct CacheEntry {
    page: PageResult,
    inserted_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A [`RecordStore`] that caches query pages of an inner store.
pub struct CachedRecordStore<S> {
    inner: S,
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Bumped on every invalidation; a query only populates the cache if no
    /// invalidation happened while it ran.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: RecordStore> CachedRecordStore<S> {
    pub fn new(inner: S, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            entries: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drop every cached page.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "Invalidated page cache");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    fn lookup(&self, key: &str) -> Option<PageResult> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.config.ttl => {
                Some(entry.page.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, page: PageResult, generation: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        if entries.len() >= self.config.capacity {
            let ttl = self.config.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        }
        if entries.len() >= self.config.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        if self.config.capacity > 0 {
            entries.insert(
                key,
                CacheEntry {
                    page,
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}

impl<S: RecordStore> RecordStore for CachedRecordStore<S> {
    async fn upsert(&self, records: Vec<Record>) -> StoreResult<usize> {
        let result = self.inner.upsert(records).await;
        // Even a failed write may have committed part of the batch.
        self.invalidate();
        result
    }

    async fn query_page(&self, query: &CatalogQuery) -> StoreResult<PageResult> {
        let key = query.signature();
        if let Some(page) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(page);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.load(Ordering::SeqCst);
        let page = self.inner.query_page(query).await?;
        self.store(key, page.clone(), generation);
        Ok(page)
    }

    async fn count(&self) -> StoreResult<u64> {
        self.inner.count().await
    }
}
