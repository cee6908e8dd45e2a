//! Cell values and row shapes for fetched results.

use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

const MICROS_PER_SECOND: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;
const DAYS_PER_MONTH: i64 = 30;

/// A SQL interval as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl PgInterval {
    /// Create an interval from its wire components.
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self { months, days, microseconds }
    }

    /// Create an interval of whole seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { months: 0, days: 0, microseconds: seconds * MICROS_PER_SECOND }
    }

    /// Total length in microseconds, counting a month as 30 days.
    pub fn total_microseconds(&self) -> i128 {
        let days = i128::from(self.months) * i128::from(DAYS_PER_MONTH) + i128::from(self.days);
        days * i128::from(SECONDS_PER_DAY * MICROS_PER_SECOND) + i128::from(self.microseconds)
    }
}

/// Renders as `[-]D day[s], H:MM:SS[.ffffff]`.
///
/// Negative durations borrow whole days so the clock part is never negative,
/// e.g. minus one second is `-1 day, 23:59:59`.
impl fmt::Display for PgInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros_per_day = i128::from(SECONDS_PER_DAY * MICROS_PER_SECOND);
        let total = self.total_microseconds();
        let days = total.div_euclid(micros_per_day);
        let rest = total.rem_euclid(micros_per_day);

        let seconds = rest / i128::from(MICROS_PER_SECOND);
        let fraction = rest % i128::from(MICROS_PER_SECOND);
        let (hours, minutes, seconds) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);

        if days != 0 {
            let unit = if days.abs() == 1 { "day" } else { "days" };
            write!(f, "{days} {unit}, ")?;
        }
        write!(f, "{hours}:{minutes:02}:{seconds:02}")?;
        if fraction != 0 {
            write!(f, ".{fraction:06}")?;
        }
        Ok(())
    }
}

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Fixed-point NUMERIC/DECIMAL value
    Decimal(Decimal),
    /// INTERVAL value
    Interval(PgInterval),
    /// JSON/JSONB document
    Json(serde_json::Value),
    Array(Vec<CellValue>),
}

impl CellValue {
    /// Render the value as a mapping key.
    ///
    /// Text is used verbatim; other values use their JSON rendering.
    pub fn as_key(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Null => String::new(),
            other => serde_json::to_value(other)
                .map(|value| match value {
                    serde_json::Value::String(s) => s,
                    v => v.to_string(),
                })
                .unwrap_or_default(),
        }
    }

    /// Borrow the text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text elements of an array value; a NULL is an empty list.
    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            Self::Array(items) => items.iter().filter_map(|item| item.as_str()).map(String::from).collect(),
            Self::Text(text) => vec![text.clone()],
            _ => Vec::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Decimal(d) => serializer.serialize_str(&d.to_string()),
            Self::Interval(i) => serializer.collect_str(i),
            Self::Json(v) => v.serialize(serializer),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// One fetched row, in the shape the connection was opened with.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Values in column order
    Tuple(Vec<CellValue>),
    /// (column, value) pairs in column order
    Keyed(Vec<(String, CellValue)>),
}

impl Row {
    /// Get a value by column name, resolving positions through `columns` for tuple rows.
    pub fn get(&self, column: &str, columns: &[String]) -> Option<&CellValue> {
        match self {
            Self::Keyed(pairs) => pairs.iter().find(|(name, _)| name == column).map(|(_, v)| v),
            Self::Tuple(values) => {
                columns.iter().position(|name| name == column).and_then(|idx| values.get(idx))
            }
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        match self {
            Self::Tuple(values) => values.len(),
            Self::Keyed(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to every cell, keeping the shape.
    pub fn map_values(self, mut f: impl FnMut(CellValue) -> CellValue) -> Self {
        match self {
            Self::Tuple(values) => Self::Tuple(values.into_iter().map(f).collect()),
            Self::Keyed(pairs) => Self::Keyed(pairs.into_iter().map(|(k, v)| (k, f(v))).collect()),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Tuple(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Self::Keyed(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (name, value) in pairs {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interval_rendering() {
        assert_eq!(PgInterval::from_seconds(12 * 3600).to_string(), "12:00:00");
        assert_eq!(PgInterval::from_seconds(90).to_string(), "0:01:30");
        assert_eq!(PgInterval::new(0, 1, 2 * 3600 * MICROS_PER_SECOND).to_string(), "1 day, 2:00:00");
        assert_eq!(PgInterval::new(0, 3, 0).to_string(), "3 days, 0:00:00");
        assert_eq!(PgInterval::new(1, 0, 0).to_string(), "30 days, 0:00:00");
        assert_eq!(PgInterval::from_seconds(-1).to_string(), "-1 day, 23:59:59");
        assert_eq!(PgInterval::new(0, 0, 1_500_000).to_string(), "0:00:01.500000");
        assert_eq!(PgInterval::default().to_string(), "0:00:00");
    }

    #[test]
    fn test_cell_serialization() {
        let decimal: Decimal = "1.01".parse().unwrap();
        let cells = vec![
            CellValue::Null,
            CellValue::Bool(true),
            CellValue::Int(7),
            CellValue::Text("a".into()),
            CellValue::Decimal(decimal),
            CellValue::Interval(PgInterval::from_seconds(60)),
            CellValue::Array(vec![CellValue::Text("x".into())]),
        ];
        let value = serde_json::to_value(Row::Tuple(cells)).unwrap();
        assert_eq!(value, json!([null, true, 7, "a", "1.01", "0:01:00", ["x"]]));
    }

    #[test]
    fn test_keyed_row_keeps_column_order() {
        let row = Row::Keyed(vec![
            ("zeta".to_string(), CellValue::Int(1)),
            ("alpha".to_string(), CellValue::Int(2)),
        ]);
        let text = serde_json::to_string(&row).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn test_row_lookup_by_column() {
        let columns = vec!["username".to_string(), "options".to_string()];
        let tuple = Row::Tuple(vec![CellValue::from("root"), CellValue::from("")]);
        assert_eq!(tuple.get("username", &columns), Some(&CellValue::from("root")));
        assert_eq!(tuple.get("missing", &columns), None);

        let keyed = Row::Keyed(vec![("username".to_string(), CellValue::from("admin"))]);
        assert_eq!(keyed.get("username", &[]), Some(&CellValue::from("admin")));
        assert_eq!(keyed.get("options", &[]), None);
    }

    #[test]
    fn test_as_key() {
        assert_eq!(CellValue::from("db").as_key(), "db");
        assert_eq!(CellValue::Int(42).as_key(), "42");
        assert_eq!(CellValue::Bool(false).as_key(), "false");
    }

    #[test]
    fn test_string_list() {
        let regions = CellValue::Array(vec![CellValue::from("us-east1"), CellValue::from("us-west1")]);
        assert_eq!(regions.to_string_list(), vec!["us-east1", "us-west1"]);
        assert!(CellValue::Null.to_string_list().is_empty());
    }
}
