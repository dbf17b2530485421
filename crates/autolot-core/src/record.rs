use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single catalog entry.
///
/// `id` is unique within the store and stable across syncs. The scalar fields
/// are the only ones that can be filtered or sorted on; everything else the
/// upstream sent is kept verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub mileage: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a record with only an id; scalar fields start out null.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            price: None,
            year: None,
            mileage: None,
            created_at: None,
            name: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_mileage(mut self, mileage: i64) -> Self {
        self.mileage = Some(mileage);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Get the value of a queryable field.
    pub fn value(&self, field: Field) -> FieldValue<'_> {
        match field {
            Field::Id => FieldValue::Text(&self.id),
            Field::Price => self.price.map(FieldValue::Float).unwrap_or(FieldValue::Null),
            Field::Year => self
                .year
                .map(|y| FieldValue::Int(y as i64))
                .unwrap_or(FieldValue::Null),
            Field::Mileage => self.mileage.map(FieldValue::Int).unwrap_or(FieldValue::Null),
            Field::CreatedAt => self
                .created_at
                .map(FieldValue::Timestamp)
                .unwrap_or(FieldValue::Null),
            Field::Name => self
                .name
                .as_deref()
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Null),
        }
    }
}

/// The allow-listed, queryable columns of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    Price,
    Year,
    Mileage,
    CreatedAt,
    Name,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Id,
        Field::Price,
        Field::Year,
        Field::Mileage,
        Field::CreatedAt,
        Field::Name,
    ];

    /// Storage column backing this field.
    pub fn column(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Price => "price",
            Field::Year => "year",
            Field::Mileage => "mileage",
            Field::CreatedAt => "created_at",
            Field::Name => "name",
        }
    }

    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        self.column()
    }

    /// Parse a wire name. Unknown names are rejected, never passed through.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Field::Id),
            "price" => Ok(Field::Price),
            "year" => Ok(Field::Year),
            "mileage" => Ok(Field::Mileage),
            "created_at" | "createdat" | "created" => Ok(Field::CreatedAt),
            "name" | "title" => Ok(Field::Name),
            other => Err(Error::invalid_query(format!("unknown field '{}'", other))),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed view of one field of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Null,
    Float(f64),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Text(&'a str),
}

impl FieldValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Compare two non-null values of the same field.
    ///
    /// Values of unrelated kinds compare equal; the id tie-break orders them.
    pub fn compare(&self, other: &FieldValue<'_>) -> Ordering {
        match (self, other) {
            (FieldValue::Float(a), FieldValue::Float(b)) => a.total_cmp(b),
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Float(a), FieldValue::Int(b)) => a.total_cmp(&(*b as f64)),
            (FieldValue::Int(a), FieldValue::Float(b)) => (*a as f64).total_cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Collapse duplicate ids, keeping the last occurrence in its first position.
///
/// A single upsert statement may not touch the same row twice.
pub fn dedupe_by_id(records: Vec<Record>) -> Vec<Record> {
    let mut positions: std::collections::HashMap<String, usize> =
        std::collections::HashMap::with_capacity(records.len());
    let mut result: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.id) {
            Some(&index) => result[index] = record,
            None => {
                positions.insert(record.id.clone(), result.len());
                result.push(record);
            }
        }
    }

    result
}
