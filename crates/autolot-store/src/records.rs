//! The record store: upsert-by-id writes and sort-and-page reads.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_postgres::{Client, IsolationLevel, Row};
use tracing::debug;

use autolot_core::{dedupe_by_id, CatalogQuery, PageResult, Record};

use crate::connect::connect;
use crate::error::StoreResult;
use crate::schema::ensure_schema;
use crate::sql::{build_count_sql, build_page_sql, build_upsert_sql, MAX_ROWS_PER_STATEMENT};

/// An ordered collection of records keyed by id.
pub trait RecordStore: Send + Sync {
    /// Insert or update records by id. Returns the number of distinct ids
    /// written.
    fn upsert(&self, records: Vec<Record>) -> impl Future<Output = StoreResult<usize>> + Send;

    /// Filter, order (tie-break included) and slice the store. Count and
    /// slice come from the same snapshot.
    fn query_page(
        &self,
        query: &CatalogQuery,
    ) -> impl Future<Output = StoreResult<PageResult>> + Send;

    /// Number of records in the store.
    fn count(&self) -> impl Future<Output = StoreResult<u64>> + Send;
}

impl<T: RecordStore> RecordStore for Arc<T> {
    fn upsert(&self, records: Vec<Record>) -> impl Future<Output = StoreResult<usize>> + Send {
        (**self).upsert(records)
    }

    fn query_page(
        &self,
        query: &CatalogQuery,
    ) -> impl Future<Output = StoreResult<PageResult>> + Send {
        (**self).query_page(query)
    }

    fn count(&self) -> impl Future<Output = StoreResult<u64>> + Send {
        (**self).count()
    }
}

/// Record store backed by the `listings` table.
pub struct PostgresRecordStore {
    client: Mutex<Client>,
}

impl PostgresRecordStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let client = connect(connection_string).await?;
        Self::from_client(client).await
    }

    pub async fn from_client(client: Client) -> StoreResult<Self> {
        ensure_schema(&client).await?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

impl RecordStore for PostgresRecordStore {
    async fn upsert(&self, records: Vec<Record>) -> StoreResult<usize> {
        let records = dedupe_by_id(records);
        if records.is_empty() {
            return Ok(0);
        }

        let client = self.client.lock().await;
        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let statement = build_upsert_sql(chunk);
            client.execute(&statement.sql, &statement.param_refs()).await?;
        }

        debug!(rows = records.len(), "Upserted records");
        Ok(records.len())
    }

    async fn query_page(&self, query: &CatalogQuery) -> StoreResult<PageResult> {
        let count_sql = build_count_sql(query);
        let page_sql = build_page_sql(query);

        let mut client = self.client.lock().await;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;

        let total: i64 = tx
            .query_one(&count_sql.sql, &count_sql.param_refs())
            .await?
            .get(0);
        let rows = tx.query(&page_sql.sql, &page_sql.param_refs()).await?;
        tx.commit().await?;

        let items = rows.iter().map(row_to_record).collect();
        Ok(PageResult::new(query.page, total.max(0) as u64, items))
    }

    async fn count(&self) -> StoreResult<u64> {
        let client = self.client.lock().await;
        let row = client.query_one("SELECT COUNT(*) FROM listings", &[]).await?;
        Ok(row.get::<_, i64>(0).max(0) as u64)
    }
}

fn row_to_record(row: &Row) -> Record {
    Record {
        id: row.get(0),
        price: row.get(1),
        year: row.get(2),
        mileage: row.get(3),
        created_at: row.get(4),
        name: row.get(5),
        payload: row.get(6),
    }
}
