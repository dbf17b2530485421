use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::page::{PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::sort::SortSpec;

/// Limits applied when building a query from wire parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// A sort-and-page query over the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub filters: FilterSet,
    pub sort: SortSpec,
    pub page: PageRequest,
}

impl CatalogQuery {
    pub fn new(filters: FilterSet, sort: SortSpec, page: PageRequest) -> Self {
        Self {
            filters,
            sort,
            page,
        }
    }

    /// Build a query from flat wire parameters.
    ///
    /// `sort`, `direction`, `page` and `pageSize` (or `page_size`) are
    /// reserved; every other key is a filter.
    pub fn from_params<'a, I>(params: I, limits: QueryLimits) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut sort = None;
        let mut direction = None;
        let mut page = None;
        let mut page_size = None;
        let mut filters = Vec::new();

        for (key, value) in params {
            match key {
                "sort" => sort = Some(value),
                "direction" | "dir" => direction = Some(value),
                "page" => page = Some(value),
                "pageSize" | "page_size" => page_size = Some(value),
                _ => filters.push((key, value)),
            }
        }

        let page = parse_int("page", page)?.unwrap_or(1);
        let page_size =
            parse_int("pageSize", page_size)?.unwrap_or(limits.default_page_size as i64);

        Ok(Self {
            filters: FilterSet::from_params(filters)?,
            sort: SortSpec::from_params(sort, direction)?,
            page: PageRequest::new(page, page_size, limits.max_page_size)?,
        })
    }

    /// Signature of the filter and sort parts, shared by every page of the
    /// same ordered candidate set.
    pub fn set_signature(&self) -> String {
        format!("{}|{}", self.filters.signature(), self.sort)
    }

    /// Full cache key: filters, sort and page.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}:{}",
            self.set_signature(),
            self.page.page(),
            self.page.page_size()
        )
    }

    /// The same query for the following page.
    pub fn next_page(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            sort: self.sort,
            page: self.page.next(),
        }
    }
}

fn parse_int(name: &str, value: Option<&str>) -> Result<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::invalid_query(format!("{} must be an integer, got '{}'", name, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::SortField;

    #[test]
    fn test_from_params_defaults() {
        let query = CatalogQuery::from_params(vec![], QueryLimits::default()).unwrap();
        assert_eq!(query.page.page(), 1);
        assert_eq!(query.page.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(query.sort, SortSpec::default());
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_from_params_full() {
        let params = vec![
            ("sort", "price"),
            ("direction", "asc"),
            ("page", "2"),
            ("pageSize", "50"),
            ("year_min", "2015"),
        ];
        let query = CatalogQuery::from_params(params, QueryLimits::default()).unwrap();

        assert_eq!(query.sort, SortSpec::asc(SortField::Price));
        assert_eq!(query.page.page(), 2);
        assert_eq!(query.page.page_size(), 50);
        assert_eq!(query.filters.len(), 1);
    }

    #[test]
    fn test_from_params_rejects_non_integer_page() {
        let err = CatalogQuery::from_params(vec![("page", "two")], QueryLimits::default())
            .unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[test]
    fn test_from_params_rejects_negative_page_size() {
        let err = CatalogQuery::from_params(vec![("pageSize", "-5")], QueryLimits::default())
            .unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[test]
    fn test_signature_distinguishes_pages_but_not_param_order() {
        let a = CatalogQuery::from_params(
            vec![("year", "2020"), ("sort", "price")],
            QueryLimits::default(),
        )
        .unwrap();
        let b = CatalogQuery::from_params(
            vec![("sort", "price"), ("year", "2020")],
            QueryLimits::default(),
        )
        .unwrap();

        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), a.next_page().signature());
        assert_eq!(a.set_signature(), a.next_page().set_signature());
    }
}
