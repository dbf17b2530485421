pub mod batcher;
pub mod checkpoint;
pub mod error;
pub mod filter;
pub mod page;
pub mod query;
pub mod record;
pub mod sort;

pub use batcher::{Batch, BatchConfig, Batcher};
pub use checkpoint::{claim_decision, resumable, Checkpoint, ClaimDecision, RunStatus};
pub use error::{Error, Result};
pub use filter::{Constraint, FilterSet, Literal};
pub use page::{PageRequest, PageResult, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use query::{CatalogQuery, QueryLimits};
pub use record::{dedupe_by_id, Field, FieldValue, Record};
pub use sort::{SortDirection, SortField, SortSpec};
