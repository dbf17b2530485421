use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};
use crate::record::{Field, FieldValue, Record};

/// A typed literal in a filter constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Float(f64),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Literal {
    /// Parse a raw wire value into the literal type of `field`.
    pub fn parse(field: Field, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || {
            Error::invalid_query(format!("invalid value '{}' for field '{}'", raw, field))
        };

        match field {
            Field::Price => raw
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Literal::Float)
                .ok_or_else(invalid),
            Field::Year => raw
                .parse::<i32>()
                .map(|y| Literal::Int(y as i64))
                .map_err(|_| invalid()),
            Field::Mileage => raw.parse::<i64>().map(Literal::Int).map_err(|_| invalid()),
            Field::CreatedAt => parse_timestamp(raw).map(Literal::Timestamp).ok_or_else(invalid),
            Field::Id | Field::Name => Ok(Literal::Text(raw.to_string())),
        }
    }

    fn as_field_value(&self) -> FieldValue<'_> {
        match self {
            Literal::Float(f) => FieldValue::Float(*f),
            Literal::Int(i) => FieldValue::Int(*i),
            Literal::Timestamp(t) => FieldValue::Timestamp(*t),
            Literal::Text(s) => FieldValue::Text(s),
        }
    }

    fn matches(&self, field: Field, value: &FieldValue<'_>) -> bool {
        match (self, value) {
            (Literal::Float(a), FieldValue::Float(b)) => (a - b).abs() < f64::EPSILON,
            (Literal::Text(a), FieldValue::Text(b)) if field == Field::Name => {
                a.to_lowercase() == b.to_lowercase()
            }
            _ => self.as_field_value().compare(value).is_eq(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Literal::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A constraint on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Field equals a literal.
    Eq(Literal),
    /// Field lies within an inclusive range; either bound may be open.
    Range {
        min: Option<Literal>,
        max: Option<Literal>,
    },
}

impl Constraint {
    fn matches(&self, field: Field, value: &FieldValue<'_>) -> bool {
        if value.is_null() {
            return false;
        }

        match self {
            Constraint::Eq(lit) => lit.matches(field, value),
            Constraint::Range { min, max } => {
                let above = min
                    .as_ref()
                    .map(|m| value.compare(&m.as_field_value()).is_ge())
                    .unwrap_or(true);
                let below = max
                    .as_ref()
                    .map(|m| value.compare(&m.as_field_value()).is_le())
                    .unwrap_or(true);
                above && below
            }
        }
    }
}

/// A conjunction of field constraints. Fields without a constraint are
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    constraints: BTreeMap<Field, Constraint>,
}

/// Which part of a constraint a wire key refers to.
enum Bound {
    Eq,
    Min,
    Max,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: Field, value: Literal) -> Self {
        self.constraints.insert(field, Constraint::Eq(value));
        self
    }

    /// Require `min <= field <= max`.
    pub fn range(mut self, field: Field, min: Option<Literal>, max: Option<Literal>) -> Self {
        self.constraints.insert(field, Constraint::Range { min, max });
        self
    }

    /// Parse wire parameters: `field=value`, `field_min=value`, `field_max=value`.
    ///
    /// Empty values impose no constraint. Unknown fields, unparseable values
    /// and equality mixed with a range on the same field are rejected.
    pub fn from_params<'a, I>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut set = FilterSet::new();

        for (key, value) in params {
            if value.trim().is_empty() {
                continue;
            }

            let (name, bound) = if let Some(name) = key.strip_suffix("_min") {
                (name, Bound::Min)
            } else if let Some(name) = key.strip_suffix("_max") {
                (name, Bound::Max)
            } else {
                (key, Bound::Eq)
            };

            let field = Field::parse(name)?;
            let literal = Literal::parse(field, value)?;
            set.apply(field, bound, literal)?;
        }

        Ok(set)
    }

    fn apply(&mut self, field: Field, bound: Bound, literal: Literal) -> Result<()> {
        let conflict =
            || Error::invalid_query(format!("conflicting constraints on field '{}'", field));

        match (self.constraints.remove(&field), bound) {
            (None, Bound::Eq) => {
                self.constraints.insert(field, Constraint::Eq(literal));
            }
            (None, Bound::Min) => {
                self.constraints.insert(
                    field,
                    Constraint::Range {
                        min: Some(literal),
                        max: None,
                    },
                );
            }
            (None, Bound::Max) => {
                self.constraints.insert(
                    field,
                    Constraint::Range {
                        min: None,
                        max: Some(literal),
                    },
                );
            }
            (Some(Constraint::Range { min: None, max }), Bound::Min) => {
                self.constraints.insert(
                    field,
                    Constraint::Range {
                        min: Some(literal),
                        max,
                    },
                );
            }
            (Some(Constraint::Range { min, max: None }), Bound::Max) => {
                self.constraints.insert(
                    field,
                    Constraint::Range {
                        min,
                        max: Some(literal),
                    },
                );
            }
            _ => return Err(conflict()),
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Constraints in field order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &Constraint)> {
        self.constraints.iter().map(|(f, c)| (*f, c))
    }

    /// Evaluate the filter set against a record.
    pub fn matches(&self, record: &Record) -> bool {
        self.constraints
            .iter()
            .all(|(field, constraint)| constraint.matches(*field, &record.value(*field)))
    }

    /// Canonical text form, stable for equal filter sets.
    pub fn signature(&self) -> String {
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|(field, constraint)| match constraint {
                Constraint::Eq(lit) => format!("{}={}", field, lit),
                Constraint::Range { min, max } => format!(
                    "{}=[{},{}]",
                    field,
                    min.as_ref().map(|l| l.to_string()).unwrap_or_default(),
                    max.as_ref().map(|l| l.to_string()).unwrap_or_default()
                ),
            })
            .collect();
        parts.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        pairs.to_vec()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filters = FilterSet::new();
        assert!(filters.matches(&Record::new("a")));
    }

    #[test]
    fn test_from_params_range() {
        let filters =
            FilterSet::from_params(params(&[("price_min", "1000"), ("price_max", "5000")]))
                .unwrap();

        assert!(filters.matches(&Record::new("a").with_price(1000.0)));
        assert!(filters.matches(&Record::new("b").with_price(5000.0)));
        assert!(!filters.matches(&Record::new("c").with_price(5000.5)));
        assert!(!filters.matches(&Record::new("d")));
    }

    #[test]
    fn test_from_params_skips_empty_values() {
        let filters = FilterSet::from_params(params(&[("year", ""), ("name", "  ")])).unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_from_params_rejects_unknown_field() {
        let err = FilterSet::from_params(params(&[("color", "red")])).unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[test]
    fn test_from_params_rejects_bad_value() {
        let err = FilterSet::from_params(params(&[("year_min", "twenty")])).unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[test]
    fn test_from_params_rejects_eq_mixed_with_range() {
        let err = FilterSet::from_params(params(&[("year", "2020"), ("year_min", "2018")]))
            .unwrap_err();
        assert!(err.to_string().contains("conflicting"));
    }

    #[test]
    fn test_name_equality_is_case_insensitive() {
        let filters = FilterSet::from_params(params(&[("name", "Civic")])).unwrap();
        assert!(filters.matches(&Record::new("a").with_name("civic")));
        assert!(!filters.matches(&Record::new("b").with_name("Accord")));
    }

    #[test]
    fn test_created_at_date_bound() {
        let filters = FilterSet::from_params(params(&[("created_at_min", "2024-01-01")])).unwrap();
        let before = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(!filters.matches(&Record::new("a").with_created_at(before)));
        assert!(filters.matches(&Record::new("b").with_created_at(after)));
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a = FilterSet::from_params(params(&[("year", "2020"), ("price_max", "9000")])).unwrap();
        let b = FilterSet::from_params(params(&[("price_max", "9000"), ("year", "2020")])).unwrap();
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), "price=[,9000]&year=2020");
    }
}
