use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{Field, Record};

/// Fields a catalog can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    Year,
    Mileage,
    CreatedAt,
    Name,
}

impl SortField {
    pub fn field(self) -> Field {
        match self {
            SortField::Price => Field::Price,
            SortField::Year => Field::Year,
            SortField::Mileage => Field::Mileage,
            SortField::CreatedAt => Field::CreatedAt,
            SortField::Name => Field::Name,
        }
    }

    pub fn column(self) -> &'static str {
        self.field().column()
    }

    /// The ORDER BY expression. Text compares bytewise so the database
    /// agrees with [`SortSpec::compare`] whatever its default collation.
    pub fn sort_expr(self) -> &'static str {
        match self {
            SortField::Name => "name COLLATE \"C\"",
            other => other.column(),
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match Field::parse(name) {
            Ok(Field::Price) => Ok(SortField::Price),
            Ok(Field::Year) => Ok(SortField::Year),
            Ok(Field::Mileage) => Ok(SortField::Mileage),
            Ok(Field::CreatedAt) => Ok(SortField::CreatedAt),
            Ok(Field::Name) => Ok(SortField::Name),
            _ => Err(Error::invalid_query(format!(
                "cannot sort by '{}': expected one of price, year, mileage, created_at, name",
                name.trim()
            ))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(Error::invalid_query(format!(
                "invalid sort direction '{}': expected asc or desc",
                other
            ))),
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A sort specification.
///
/// The primary key is always followed by an implicit `id ASC` tie-break so
/// that the order is total, and nulls in the primary field sort last in both
/// directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn asc(field: SortField) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: SortField) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    /// Build from optional wire values, falling back to the default sort for
    /// whichever part is absent.
    pub fn from_params(field: Option<&str>, direction: Option<&str>) -> Result<Self> {
        let default = Self::default();
        let field = match field.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => SortField::parse(name)?,
            None => default.field,
        };
        let direction = match direction.map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => SortDirection::parse(dir)?,
            None => default.direction,
        };
        Ok(Self { field, direction })
    }

    /// The full ORDER BY clause, tie-break included.
    pub fn order_by_sql(&self) -> String {
        format!(
            "{} {} NULLS LAST, id COLLATE \"C\" ASC",
            self.field.sort_expr(),
            self.direction.sql()
        )
    }

    /// Total order over records under this specification.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let field = self.field.field();
        let left = a.value(field);
        let right = b.value(field);

        let primary = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = left.compare(&right);
                match self.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        };

        primary.then_with(|| a.id.as_bytes().cmp(b.id.as_bytes()))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.field.column(),
            self.direction.sql().to_ascii_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut records: Vec<Record>, spec: SortSpec) -> Vec<String> {
        records.sort_by(|a, b| spec.compare(a, b));
        records.into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_nulls_last_ascending() {
        let records = vec![
            Record::new("a"),
            Record::new("b").with_price(20.0),
            Record::new("c").with_price(10.0),
        ];
        assert_eq!(
            sorted(records, SortSpec::asc(SortField::Price)),
            vec!["c", "b", "a"]
        );
    }

    #[test]
    fn test_nulls_last_descending() {
        let records = vec![
            Record::new("a"),
            Record::new("b").with_price(20.0),
            Record::new("c").with_price(10.0),
        ];
        assert_eq!(
            sorted(records, SortSpec::desc(SortField::Price)),
            vec!["b", "c", "a"]
        );
    }

    #[test]
    fn test_tie_break_by_id_ascending_in_both_directions() {
        let records = vec![
            Record::new("b").with_year(2020),
            Record::new("a").with_year(2020),
            Record::new("c").with_year(2020),
        ];
        assert_eq!(
            sorted(records.clone(), SortSpec::asc(SortField::Year)),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            sorted(records, SortSpec::desc(SortField::Year)),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_from_params_defaults_and_rejections() {
        assert_eq!(SortSpec::from_params(None, None).unwrap(), SortSpec::default());
        assert_eq!(
            SortSpec::from_params(Some("price"), Some("asc")).unwrap(),
            SortSpec::asc(SortField::Price)
        );
        assert_eq!(
            SortSpec::from_params(Some(""), Some("")).unwrap(),
            SortSpec::default()
        );

        assert!(SortSpec::from_params(Some("id"), None).is_err());
        assert!(SortSpec::from_params(Some("color"), None).is_err());
        assert!(SortSpec::from_params(Some("price"), Some("sideways")).is_err());
    }

    #[test]
    fn test_order_by_sql_includes_tie_break() {
        let spec = SortSpec::asc(SortField::Mileage);
        assert_eq!(
            spec.order_by_sql(),
            "mileage ASC NULLS LAST, id COLLATE \"C\" ASC"
        );
    }

    #[test]
    fn test_name_sorts_bytewise_in_sql() {
        assert_eq!(
            SortSpec::desc(SortField::Name).order_by_sql(),
            "name COLLATE \"C\" DESC NULLS LAST, id COLLATE \"C\" ASC"
        );
    }

    #[test]
    fn test_name_compare_is_bytewise() {
        let names = ["b", "B", "a", "Z"];
        let mut records: Vec<Record> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Record::new(format!("r{}", i)).with_name(*name))
            .collect();
        records.sort_by(|a, b| SortSpec::asc(SortField::Name).compare(a, b));
        let sorted: Vec<_> = records.iter().filter_map(|r| r.name.as_deref()).collect();
        assert_eq!(sorted, vec!["B", "Z", "a", "b"]);
    }
}
