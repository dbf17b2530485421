//! Turning untrusted upstream objects into [`Record`]s.
//!
//! Scalar fields never fail: anything that cannot be coerced becomes null.
//! Only a missing or unusable id rejects the record. Values the store cannot
//! hold (NUL characters, timestamps before its earliest year) are cleaned
//! here so one bad object never fails a whole batch.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use autolot_core::{Error, Record, Result};

/// Unix timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: u64 = 1_000_000_000_000;

/// Earliest year a Postgres `timestamptz` can hold.
const MIN_STORABLE_YEAR: i32 = -4712;

/// Where each record field lives in an upstream object. Paths are dotted
/// (`"vehicle.year"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPaths {
    pub id: String,
    pub price: String,
    pub year: String,
    pub mileage: String,
    pub created_at: String,
    pub name: String,
}

impl Default for FieldPaths {
    fn default() -> Self {
        Self {
            id: "id".into(),
            price: "price".into(),
            year: "year".into(),
            mileage: "mileage".into(),
            created_at: "created_at".into(),
            name: "title".into(),
        }
    }
}

/// Follow a dotted path through nested objects.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// Normalize one upstream object.
pub fn normalize(raw: &Value, paths: &FieldPaths) -> Result<Record> {
    if !raw.is_object() {
        return Err(Error::malformed(format!(
            "expected a JSON object, got {}",
            kind(raw)
        )));
    }

    let id = lookup(raw, &paths.id)
        .and_then(coerce_id)
        .ok_or_else(|| Error::malformed(format!("missing or invalid id at '{}'", paths.id)))?;

    let field = |path: &str| lookup(raw, path);

    Ok(Record {
        id,
        price: field(&paths.price).and_then(coerce_f64),
        year: field(&paths.year).and_then(coerce_year),
        mileage: field(&paths.mileage).and_then(coerce_i64),
        created_at: field(&paths.created_at).and_then(coerce_timestamp),
        name: field(&paths.name).and_then(coerce_text),
        payload: strip_nul(raw),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.contains('\0') => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Strip the decorations people put in numeric strings: whitespace, a
/// currency sign and digit group separators.
fn clean_numeric(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix('$').unwrap_or(s);
    s.chars().filter(|c| *c != ',' && *c != '_').collect()
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => clean_numeric(s).parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| float_to_i64(n.as_f64()?.round())),
        Value::String(s) => {
            let cleaned = clean_numeric(s);
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| float_to_i64(cleaned.parse::<f64>().ok()?.round()))
        }
        _ => None,
    }
}

pub(crate) fn coerce_u64(value: &Value) -> Option<u64> {
    coerce_i64(value).and_then(|i| u64::try_from(i).ok())
}

fn coerce_year(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => n.as_i64().or_else(|| integral(n.as_f64()?))?,
        Value::String(s) => {
            let cleaned = clean_numeric(s);
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| integral(cleaned.parse::<f64>().ok()?))?
        }
        _ => return None,
    };
    i32::try_from(year).ok()
}

fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 {
        float_to_i64(f)
    } else {
        None
    }
}

fn float_to_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp(value).filter(|t| t.year() >= MIN_STORABLE_YEAR)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_unix(n.as_i64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return Some(t.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&t));
                }
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
            }
            from_unix(s.parse::<i64>().ok()?)
        }
        _ => None,
    }
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts.unsigned_abs() > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.replace('\0', "");
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy of `value` with NUL removed from every string and key.
fn strip_nul(value: &Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(s.replace('\0', "")),
        Value::Array(items) => Value::Array(items.iter().map(strip_nul).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.replace('\0', ""), strip_nul(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
