use serde_json::Value;
use tracing::debug;

use autolot_core::Record;

use crate::normalize::{coerce_u64, lookup, normalize, FieldPaths};

/// One page of upstream data, normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub records: Vec<Record>,
    /// Entries in the raw `data` array, malformed ones included.
    pub fetched: usize,
    /// Entries dropped because they could not be normalized.
    pub skipped: usize,
    pub has_more: bool,
    /// `meta.total`, when the upstream reported a usable one.
    pub known_total: Option<u64>,
}

impl SourcePage {
    /// A page carrying records, with more to follow.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            fetched: records.len(),
            records,
            skipped: 0,
            has_more: true,
            known_total: None,
        }
    }

    /// An empty page whose metadata still says more pages exist.
    pub fn empty() -> Self {
        Self {
            has_more: true,
            ..Self::default()
        }
    }

    /// The last page.
    pub fn end() -> Self {
        Self::default()
    }

    pub fn last(mut self) -> Self {
        self.has_more = false;
        self
    }

    pub fn with_known_total(mut self, total: u64) -> Self {
        self.known_total = Some(total);
        self
    }

    /// True iff the upstream returned no entries at all.
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

/// Interpret a `{data: [...], meta: {current_page, last_page, total}}` body.
///
/// Nothing here fails: a missing `data` array is an empty page and unusable
/// meta fields are treated as absent. When the metadata names both the
/// current and the last page it decides `has_more`; otherwise an empty page
/// means the end of the data.
pub fn parse_page(body: &Value, paths: &FieldPaths) -> SourcePage {
    let data: &[Value] = match body {
        Value::Array(items) => items.as_slice(),
        _ => body
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };

    let meta = |key: &str| lookup(body, &format!("meta.{}", key)).and_then(coerce_u64);
    let current_page = meta("current_page");
    let last_page = meta("last_page");
    let known_total = meta("total");

    let mut records = Vec::with_capacity(data.len());
    let mut skipped = 0;
    for raw in data {
        match normalize(raw, paths) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "Skipping malformed upstream record");
            }
        }
    }

    let has_more = match (current_page, last_page) {
        (Some(current), Some(last)) => current < last,
        _ => !data.is_empty(),
    };

    SourcePage {
        records,
        fetched: data.len(),
        skipped,
        has_more,
        known_total,
    }
}
