use tokio_postgres::Client;
use tracing::{debug, info};

use crate::error::StoreResult;

pub const SYNC_STATE_TABLE: &str = "__autolot_sync_state";

const CREATE_LISTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    price DOUBLE PRECISION,
    year INTEGER,
    mileage BIGINT,
    created_at TIMESTAMPTZ,
    name TEXT,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    synced_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// One index per sortable column, with the tie-break key included so the
/// full ORDER BY can be served from the index.
const CREATE_SORT_INDEXES: [&str; 5] = [
    r#"CREATE INDEX IF NOT EXISTS listings_price_idx ON listings (price, id COLLATE "C")"#,
    r#"CREATE INDEX IF NOT EXISTS listings_year_idx ON listings (year, id COLLATE "C")"#,
    r#"CREATE INDEX IF NOT EXISTS listings_mileage_idx ON listings (mileage, id COLLATE "C")"#,
    r#"CREATE INDEX IF NOT EXISTS listings_created_at_idx ON listings (created_at, id COLLATE "C")"#,
    r#"CREATE INDEX IF NOT EXISTS listings_name_c_idx ON listings (name COLLATE "C", id COLLATE "C")"#,
];

const CREATE_SYNC_STATE: &str = r#"
CREATE TABLE IF NOT EXISTS __autolot_sync_state (
    stream TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    version BIGINT NOT NULL DEFAULT 1,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Ensure all required tables and indexes exist.
pub async fn ensure_schema(client: &Client) -> StoreResult<()> {
    debug!("Ensuring autolot schema exists");

    client.execute(CREATE_LISTINGS, &[]).await?;
    for statement in CREATE_SORT_INDEXES {
        client.execute(statement, &[]).await?;
    }
    client.execute(CREATE_SYNC_STATE, &[]).await?;

    info!("Autolot schema initialized");
    Ok(())
}
