//! The upstream side of ingestion: a paged API, read one page at a time.

mod client;
mod error;
mod mock;
mod normalize;
mod page;

pub use client::{HttpPagedSource, HttpSourceConfig, PagedSource};
pub use error::{FetchError, FetchResult};
pub use mock::{MockResponse, MockSource};
pub use normalize::{lookup, normalize, FieldPaths};
pub use page::{parse_page, SourcePage};
