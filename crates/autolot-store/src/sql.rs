//! SQL text and parameters for the listings table.
//!
//! Column names only ever come from [`Field::column`]; every caller-supplied
//! value travels as a positional parameter.

use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;

use autolot_core::{CatalogQuery, Constraint, Field, FilterSet, Literal, Record};

pub const LISTINGS_TABLE: &str = "listings";

const RECORD_COLUMNS: &str = "id, price, year, mileage, created_at, name, payload";

/// Postgres caps a statement at 65535 bind parameters; 7 per row.
pub const MAX_ROWS_PER_STATEMENT: usize = 5000;

/// A typed bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Float8(Option<f64>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Timestamp(Option<DateTime<Utc>>),
    Text(Option<String>),
    Json(serde_json::Value),
}

impl SqlParam {
    pub fn as_to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Float8(v) => v,
            SqlParam::Int4(v) => v,
            SqlParam::Int8(v) => v,
            SqlParam::Timestamp(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Json(v) => v,
        }
    }

    /// Bind a filter literal with the column type of `field`.
    fn for_field(field: Field, literal: &Literal) -> Self {
        match (field, literal) {
            (Field::Year, Literal::Int(i)) => {
                SqlParam::Int4(Some((*i).clamp(i32::MIN as i64, i32::MAX as i64) as i32))
            }
            (_, Literal::Int(i)) => SqlParam::Int8(Some(*i)),
            (_, Literal::Float(f)) => SqlParam::Float8(Some(*f)),
            (_, Literal::Timestamp(t)) => SqlParam::Timestamp(Some(*t)),
            (_, Literal::Text(s)) => SqlParam::Text(Some(s.clone())),
        }
    }
}

/// SQL text together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(SqlParam::as_to_sql).collect()
    }

    fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

/// Render the WHERE clause for a filter set, appending parameters to `query`.
fn where_clause(filters: &FilterSet, query: &mut SqlQuery) -> String {
    let mut predicates = Vec::new();

    for (field, constraint) in filters.iter() {
        let column = field.column();
        match constraint {
            Constraint::Eq(lit) => {
                let param = query.push(SqlParam::for_field(field, lit));
                if field == Field::Name {
                    predicates.push(format!("LOWER({}) = LOWER({})", column, param));
                } else {
                    predicates.push(format!("{} = {}", column, param));
                }
            }
            Constraint::Range { min, max } => {
                if let Some(min) = min {
                    let param = query.push(SqlParam::for_field(field, min));
                    predicates.push(format!("{} >= {}", column, param));
                }
                if let Some(max) = max {
                    let param = query.push(SqlParam::for_field(field, max));
                    predicates.push(format!("{} <= {}", column, param));
                }
            }
        }
    }

    if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    }
}

/// `SELECT COUNT(*)` over the candidate set.
pub fn build_count_sql(query: &CatalogQuery) -> SqlQuery {
    let mut out = SqlQuery {
        sql: String::new(),
        params: Vec::new(),
    };
    let filter = where_clause(&query.filters, &mut out);
    out.sql = format!("SELECT COUNT(*) FROM {}{}", LISTINGS_TABLE, filter);
    out
}

/// The ordered, sliced page of the candidate set.
pub fn build_page_sql(query: &CatalogQuery) -> SqlQuery {
    let mut out = SqlQuery {
        sql: String::new(),
        params: Vec::new(),
    };
    let filter = where_clause(&query.filters, &mut out);
    let limit = out.push(SqlParam::Int8(Some(query.page.page_size() as i64)));
    let offset = out.push(SqlParam::Int8(Some(query.page.offset() as i64)));

    out.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        RECORD_COLUMNS,
        LISTINGS_TABLE,
        filter,
        query.sort.order_by_sql(),
        limit,
        offset
    );
    out
}

/// Multi-row upsert keyed by id. Callers must pass distinct ids and at most
/// [`MAX_ROWS_PER_STATEMENT`] rows.
pub fn build_upsert_sql(records: &[Record]) -> SqlQuery {
    let mut out = SqlQuery {
        sql: String::new(),
        params: Vec::with_capacity(records.len() * 7),
    };

    let rows: Vec<String> = records
        .iter()
        .map(|r| {
            let placeholders = [
                out.push(SqlParam::Text(Some(r.id.clone()))),
                out.push(SqlParam::Float8(r.price)),
                out.push(SqlParam::Int4(r.year)),
                out.push(SqlParam::Int8(r.mileage)),
                out.push(SqlParam::Timestamp(r.created_at)),
                out.push(SqlParam::Text(r.name.clone())),
                out.push(SqlParam::Json(r.payload.clone())),
            ];
            format!("({}, NOW())", placeholders.join(", "))
        })
        .collect();

    out.sql = format!(
        "INSERT INTO {table} ({columns}, synced_at) VALUES {rows} \
         ON CONFLICT (id) DO UPDATE SET \
         price = EXCLUDED.price, year = EXCLUDED.year, mileage = EXCLUDED.mileage, \
         created_at = EXCLUDED.created_at, name = EXCLUDED.name, payload = EXCLUDED.payload, \
         synced_at = EXCLUDED.synced_at",
        table = LISTINGS_TABLE,
        columns = RECORD_COLUMNS,
        rows = rows.join(", ")
    );
    out
}
