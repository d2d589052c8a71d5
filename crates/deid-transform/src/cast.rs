//! Value casts applied to a transformer's target column.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use deid_model::ValueCast;
use polars::prelude::*;

use crate::error::{Result, TransformError};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Cast `column` of `table` to the dtype named by `cast`.
///
/// Casts are lenient: values that cannot be converted become null.
pub fn apply_value_cast(table: DataFrame, column: &str, cast: ValueCast) -> Result<DataFrame> {
    let Ok(source) = table.column(column) else {
        return Err(TransformError::ColumnNotFound {
            column: column.to_string(),
        });
    };

    let converted = match cast {
        ValueCast::Integer => source.cast(&DataType::Int64)?,
        ValueCast::Float => source.cast(&DataType::Float64)?,
        ValueCast::String => source.cast(&DataType::String)?,
        ValueCast::Datetime => to_datetime(source)?,
    };

    let mut table = table;
    table.with_column(converted)?;
    Ok(table)
}

fn to_datetime(source: &Column) -> Result<Column> {
    match source.dtype() {
        DataType::Datetime(TimeUnit::Microseconds, _) => Ok(source.clone()),
        DataType::Datetime(_, tz) => Ok(source.cast(&DataType::Datetime(
            TimeUnit::Microseconds,
            tz.clone(),
        ))?),
        DataType::Date => Ok(source.cast(&DataType::Datetime(TimeUnit::Microseconds, None))?),
        DataType::String => {
            let micros: Int64Chunked = source
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_datetime_micros))
                .collect();
            Ok(micros
                .with_name(source.name().clone())
                .into_datetime(TimeUnit::Microseconds, None)
                .into_series()
                .into_column())
        }
        DataType::Null => Ok(source.cast(&DataType::Datetime(TimeUnit::Microseconds, None))?),
        dtype => Err(TransformError::Cast {
            column: source.name().to_string(),
            from: dtype.to_string(),
            to: ValueCast::Datetime.to_string(),
        }),
    }
}

/// Parse an ISO 8601 date or datetime into microseconds since the epoch.
pub(crate) fn parse_datetime_micros(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Some(value.timestamp_micros());
    }
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Some(value.and_utc().timestamp_micros());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| value.and_utc().timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dates_and_datetimes() {
        assert_eq!(parse_datetime_micros("1970-01-02"), Some(86_400_000_000));
        assert_eq!(parse_datetime_micros("1970-01-01T00:00:01"), Some(1_000_000));
        assert_eq!(parse_datetime_micros("1970-01-01 00:01"), Some(60_000_000));
        assert_eq!(parse_datetime_micros("1970-01-01T01:00:00+01:00"), Some(0));
        assert_eq!(parse_datetime_micros("yesterday"), None);
    }

    #[test]
    fn integer_cast_is_lenient() {
        let table = df! { "id" => &["1", "x", "3"] }.unwrap();
        let table = apply_value_cast(table, "id", ValueCast::Integer).unwrap();
        let ids: Vec<_> = table.column("id").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn string_column_becomes_datetime() {
        let table = df! { "ts" => &["2024-01-31", "2024-02-01 12:00:00"] }.unwrap();
        let table = apply_value_cast(table, "ts", ValueCast::Datetime).unwrap();
        assert_eq!(
            table.column("ts").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );
    }

    #[test]
    fn missing_column_is_reported() {
        let table = df! { "id" => &[1i64] }.unwrap();
        let err = apply_value_cast(table, "other", ValueCast::Float).unwrap_err();
        assert!(matches!(err, TransformError::ColumnNotFound { .. }));
    }
}
