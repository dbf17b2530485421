use crate::record::Record;

/// Limits for a single upsert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_rows: usize,
    pub max_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            max_bytes: 4 * 1024 * 1024,
        }
    }
}

impl BatchConfig {
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
            ..Default::default()
        }
    }
}

/// A batch of records destined for one upsert call.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub records: Vec<Record>,
    estimated_size: usize,
}

impl Batch {
    fn add(&mut self, record: Record, size: usize) {
        self.records.push(record);
        self.estimated_size += size;
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn size(&self) -> usize {
        self.estimated_size
    }
}

/// Groups records into upsert batches, respecting row and size limits.
pub struct Batcher {
    config: BatchConfig,
    current: Batch,
}

impl Batcher {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            current: Batch::default(),
        }
    }

    /// Add a record. Returns a batch if one is ready to flush.
    pub fn add(&mut self, record: Record) -> Option<Batch> {
        let size = estimate_record_size(&record);

        let would_exceed = self.current.len() >= self.config.max_rows
            || (self.current.size() + size) > self.config.max_bytes;

        if would_exceed && !self.current.is_empty() {
            let ready = std::mem::take(&mut self.current);
            self.current.add(record, size);
            Some(ready)
        } else {
            self.current.add(record, size);
            None
        }
    }

    /// Flush the pending batch.
    pub fn flush(&mut self) -> Option<Batch> {
        let batch = std::mem::take(&mut self.current);
        (!batch.is_empty()).then_some(batch)
    }

    pub fn pending_count(&self) -> usize {
        self.current.len()
    }

    /// Split a page of records into ready-to-write batches.
    pub fn split(config: BatchConfig, records: Vec<Record>) -> Vec<Batch> {
        let mut batcher = Batcher::new(config);
        let mut batches: Vec<Batch> = records
            .into_iter()
            .filter_map(|record| batcher.add(record))
            .collect();
        batches.extend(batcher.flush());
        batches
    }
}

/// Estimate the size of a record in bytes.
fn estimate_record_size(record: &Record) -> usize {
    // Rough estimate: serialize to JSON and measure
    serde_json::to_string(record).map(|s| s.len()).unwrap_or(256)
}
