//! Result normalization.
//!
//! The result document is plain JSON, so fixed-point decimals become floats
//! and intervals become their clock rendering (`12:00:00`). Everything else is
//! already portable and passes through untouched. Row shape is preserved.

use crate::models::{CellValue, Row};

/// Normalize every cell of every row.
pub fn normalize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter().map(normalize_row).collect()
}

/// Normalize every cell of one row, keeping its shape.
pub fn normalize_row(row: Row) -> Row {
    row.map_values(normalize_value)
}

/// Normalize one cell.
pub fn normalize_value(value: CellValue) -> CellValue {
    match value {
        CellValue::Decimal(d) => match d.to_string().parse::<f64>() {
            Ok(f) => CellValue::Float(f),
            Err(_) => CellValue::Text(d.to_string()),
        },
        CellValue::Interval(interval) => CellValue::Text(interval.to_string()),
        CellValue::Array(items) => CellValue::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PgInterval;
    use rust_decimal::Decimal;

    #[test]
    fn test_decimal_becomes_float() {
        let d: Decimal = "1.01".parse().unwrap();
        assert_eq!(normalize_value(CellValue::Decimal(d)), CellValue::Float(1.01));
    }

    #[test]
    fn test_interval_becomes_string() {
        let twelve_hours = PgInterval::from_seconds(12 * 3600);
        assert_eq!(
            normalize_value(CellValue::Interval(twelve_hours)),
            CellValue::Text("12:00:00".to_string())
        );
    }

    #[test]
    fn test_supported_values_are_unchanged() {
        let row = Row::Tuple(vec![
            CellValue::Int(1),
            CellValue::Text("a".into()),
            CellValue::Null,
            CellValue::Bool(false),
            CellValue::Float(2.5),
        ]);
        assert_eq!(normalize_row(row.clone()), row);
        // Idempotent
        assert_eq!(normalize_row(normalize_row(row.clone())), row);
    }

    #[test]
    fn test_shape_is_preserved() {
        let d: Decimal = "3.5".parse().unwrap();
        let rows = vec![
            Row::Tuple(vec![CellValue::Decimal(d)]),
            Row::Keyed(vec![
                ("amount".to_string(), CellValue::Decimal(d)),
                ("wait".to_string(), CellValue::Interval(PgInterval::from_seconds(90))),
            ]),
        ];
        let normalized = normalize_rows(rows);
        assert_eq!(normalized[0], Row::Tuple(vec![CellValue::Float(3.5)]));
        assert_eq!(
            normalized[1],
            Row::Keyed(vec![
                ("amount".to_string(), CellValue::Float(3.5)),
                ("wait".to_string(), CellValue::Text("0:01:30".to_string())),
            ])
        );
    }

    #[test]
    fn test_arrays_are_normalized_elementwise() {
        let d: Decimal = "0.5".parse().unwrap();
        let value = CellValue::Array(vec![CellValue::Decimal(d), CellValue::Null]);
        assert_eq!(
            normalize_value(value),
            CellValue::Array(vec![CellValue::Float(0.5), CellValue::Null])
        );
    }
}
