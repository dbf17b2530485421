use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::Record;

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: u64 = 24;

/// Upper bound on the page size a caller may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// A validated, 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    page: u64,
    page_size: u64,
}

impl PageRequest {
    /// Validate raw wire values. Nothing is clamped: zero or negative pages,
    /// page sizes outside `1..=max_page_size` and offsets that do not fit a
    /// signed 64-bit integer are rejected.
    pub fn new(page: i64, page_size: i64, max_page_size: u64) -> Result<Self> {
        if page < 1 {
            return Err(Error::invalid_query(format!(
                "page must be >= 1, got {}",
                page
            )));
        }
        if page_size < 1 {
            return Err(Error::invalid_query(format!(
                "page size must be >= 1, got {}",
                page_size
            )));
        }
        if page_size as u64 > max_page_size {
            return Err(Error::invalid_query(format!(
                "page size must be <= {}, got {}",
                max_page_size, page_size
            )));
        }

        let request = Self {
            page: page as u64,
            page_size: page_size as u64,
        };

        let offset_fits = (request.page - 1)
            .checked_mul(request.page_size)
            .map(|offset| offset <= i64::MAX as u64)
            .unwrap_or(false);
        if !offset_fits {
            return Err(Error::invalid_query(format!(
                "page {} is out of addressable range",
                page
            )));
        }

        Ok(request)
    }

    /// First page with the given size.
    pub fn first(page_size: u64) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of records preceding this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }

    /// The same request for the following page.
    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            page_size: self.page_size,
        }
    }
}

/// One page of an ordered, filtered collection plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub items: Vec<Record>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageResult {
    /// Assemble a result from the total size of the candidate set and the
    /// records of the requested slice.
    pub fn new(request: PageRequest, total: u64, items: Vec<Record>) -> Self {
        let page = request.page();
        let page_size = request.page_size();

        Self {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
            has_next: page.saturating_mul(page_size) < total,
            has_prev: page > 1 && total > 0,
        }
    }

    /// Whether the requested page lies beyond the last page.
    pub fn is_out_of_range(&self) -> bool {
        self.page > self.total_pages
    }
}
