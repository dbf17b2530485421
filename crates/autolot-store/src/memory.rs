use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use autolot_core::{dedupe_by_id, CatalogQuery, PageResult, Record};

use crate::error::{StoreError, StoreResult};
use crate::records::RecordStore;

/// An in-memory record store.
///
/// Queries filter and order the whole candidate set before slicing, exactly
/// like the SQL path. Clones share state, so a test can hand one clone to the
/// ingestion loop and keep another for assertions.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    rows: Arc<RwLock<HashMap<String, Record>>>,
    /// Number of upcoming upsert calls that should fail.
    fail_next: Arc<AtomicUsize>,
    /// Row counts of every successful upsert call.
    upserts: Arc<Mutex<Vec<usize>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with records.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                rows.insert(record.id.clone(), record);
            }
        }
        store
    }

    /// Make the next `n` upsert calls fail.
    pub fn fail_next_upserts(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Row counts of the successful upsert calls so far.
    pub fn upsert_calls(&self) -> Vec<usize> {
        self.upserts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RecordStore for MemoryRecordStore {
    async fn upsert(&self, records: Vec<Record>) -> StoreResult<usize> {
        if self.take_failure() {
            return Err(StoreError::WriteRejected("simulated upsert failure".into()));
        }

        let records = dedupe_by_id(records);
        let written = records.len();
        {
            let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                rows.insert(record.id.clone(), record);
            }
        }

        self.upserts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(written);
        Ok(written)
    }

    async fn query_page(&self, query: &CatalogQuery) -> StoreResult<PageResult> {
        let mut candidates: Vec<Record> = self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|record| query.filters.matches(record))
            .cloned()
            .collect();

        candidates.sort_by(|a, b| query.sort.compare(a, b));

        let total = candidates.len() as u64;
        let items = candidates
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.page_size() as usize)
            .collect();

        Ok(PageResult::new(query.page, total, items))
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.len() as u64)
    }
}
