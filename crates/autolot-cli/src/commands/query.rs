use anyhow::{Context, Result};

use autolot_config::ProjectConfig;
use autolot_core::CatalogQuery;
use autolot_store::RecordStore;

use crate::components;

pub struct QueryArgs {
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub filters: Vec<(String, String)>,
}

impl QueryArgs {
    /// The same flat parameters the HTTP surface accepts.
    fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(sort) = &self.sort {
            params.push(("sort".to_string(), sort.clone()));
        }
        if let Some(direction) = &self.direction {
            params.push(("direction".to_string(), direction.clone()));
        }
        if let Some(page) = self.page {
            params.push(("page".to_string(), page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            params.push(("pageSize".to_string(), page_size.to_string()));
        }
        params.extend(self.filters.iter().cloned());
        params
    }
}

pub async fn cmd_query(config: ProjectConfig, args: QueryArgs) -> Result<()> {
    let params = args.params();
    let query = CatalogQuery::from_params(
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        config.query.limits(),
    )
    .context("Invalid query")?;

    let store = components::record_store(&config).await?;
    let page = store
        .query_page(&query)
        .await
        .context("Catalog query failed")?;

    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolot_core::{QueryLimits, SortField, SortSpec};

    #[test]
    fn test_args_build_a_query() {
        let args = QueryArgs {
            sort: Some("year".into()),
            direction: Some("asc".into()),
            page: Some(3),
            page_size: Some(10),
            filters: vec![("price_max".into(), "20000".into())],
        };
        let params = args.params();
        let query = CatalogQuery::from_params(
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            QueryLimits::default(),
        )
        .unwrap();

        assert_eq!(query.sort, SortSpec::asc(SortField::Year));
        assert_eq!(query.page.page(), 3);
        assert_eq!(query.page.page_size(), 10);
        assert_eq!(query.filters.len(), 1);
    }
}
