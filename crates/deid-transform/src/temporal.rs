//! Consistent random date and time shifting.
//!
//! Every distinct value of the reference column draws one offset, and every
//! timestamp of that reference is moved by the same amount. Intervals between
//! events of one entity are therefore preserved. Offsets are stored under
//! `<reference>_shift` so later tables and later runs reuse them.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use deid_model::{KeyColumn, KeyValue, MappingStore, TimeShiftSpec, TimeShiftUnit, time_shift_key};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{ConfigError, Result, TransformError};
use crate::merge::{key_column, lookup};
use crate::transformer::{Direction, Transformer};

pub const KIND: &str = "datetime_shift";

/// Days between 0001-01-01 (day 1 of the common era) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Parameters of a `datetime_shift` node.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatetimeShiftParams {
    /// Table column holding the reference identifier.
    pub reference_column: String,
    /// Store reference; defaults to `reference_column`.
    #[serde(default)]
    pub reference: Option<String>,
    /// Column to shift.
    pub datetime_column: String,
    /// Overrides the run's default shift range.
    #[serde(default)]
    pub time_shift: Option<TimeShiftSpec>,
}

#[derive(Debug, Clone)]
pub struct DatetimeShiftTransformer {
    reference_column: String,
    reference: String,
    datetime_column: String,
    shift: TimeShiftSpec,
}

impl DatetimeShiftTransformer {
    pub fn new(
        reference_column: impl Into<String>,
        reference: Option<String>,
        datetime_column: impl Into<String>,
        shift: TimeShiftSpec,
    ) -> Self {
        let reference_column = reference_column.into();
        let reference = reference.unwrap_or_else(|| reference_column.clone());
        Self {
            reference_column,
            reference,
            datetime_column: datetime_column.into(),
            shift,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn datetime_column(&self) -> &str {
        &self.datetime_column
    }

    pub fn shift(&self) -> &TimeShiftSpec {
        &self.shift
    }

    /// Store key holding this transformer's offsets.
    pub fn store_key(&self) -> String {
        time_shift_key(&self.reference)
    }

    /// Random source for new offsets. A configured seed is hashed together
    /// with the store key and the number of offsets already recorded, so
    /// each reference and each later batch of new values draws its own
    /// stream.
    fn rng(&self, recorded: usize) -> StdRng {
        match self.shift.seed {
            Some(seed) => {
                let mut hasher = Sha256::new();
                hasher.update(seed.to_le_bytes());
                hasher.update(self.store_key().as_bytes());
                hasher.update((recorded as u64).to_le_bytes());
                StdRng::from_seed(hasher.finalize().into())
            }
            None => StdRng::from_entropy(),
        }
    }

    /// Per-row offsets for the reference column, drawing new ones when
    /// `assign` is given.
    fn offsets(
        &self,
        table: &DataFrame,
        store: &MappingStore,
        assign: bool,
    ) -> Result<(Vec<i64>, Vec<KeyValue>, Vec<i64>)> {
        let source = key_column(table, &self.reference_column)?;
        let key = self.store_key();

        let (existing, offsets) = match store.get(&key) {
            Some(entry) => (entry.value_keys()?, entry.surrogates()?),
            None if assign => (
                KeyColumn::from_values(&self.reference, source.family(), Vec::new()),
                Vec::new(),
            ),
            None => return Err(TransformError::MissingEntry { key }),
        };

        let compatible = existing.is_empty() || existing.family() == source.family();
        let new_values: Vec<KeyValue> = if assign && compatible {
            let known: HashSet<&KeyValue> = existing.values().iter().flatten().collect();
            source
                .distinct()
                .into_iter()
                .filter(|value| !known.contains(value))
                .collect()
        } else {
            Vec::new()
        };
        if !new_values.is_empty() && self.shift.min >= self.shift.max {
            return Err(ConfigError::InvalidShiftRange {
                node: self.reference.clone(),
                min: self.shift.min,
                max: self.shift.max,
            }
            .into());
        }
        let mut rng = self.rng(offsets.len());
        let new_offsets: Vec<i64> = new_values
            .iter()
            .map(|_| rng.gen_range(self.shift.min..self.shift.max))
            .collect();

        let family = if existing.is_empty() {
            source.family()
        } else {
            existing.family()
        };
        let mut keys = existing.values().to_vec();
        keys.extend(new_values.iter().cloned().map(Some));
        let mut outputs = offsets;
        outputs.extend(new_offsets.iter().copied().map(Some));
        let mapping = KeyColumn::from_values(&self.reference, family, keys);

        let per_row: Vec<Option<i64>> = lookup(&source, &mapping, &outputs)?;
        // An empty offset cell in a persisted file shifts by zero.
        let per_row = per_row.into_iter().map(|offset| offset.unwrap_or(0)).collect();
        Ok((per_row, new_values, new_offsets))
    }

    fn shift_column(&self, table: DataFrame, offsets: &[i64], sign: i64) -> Result<DataFrame> {
        let Ok(column) = table.column(&self.datetime_column) else {
            return Err(TransformError::ColumnNotFound {
                column: self.datetime_column.clone(),
            });
        };
        let shifted = shift_series(
            column.as_materialized_series(),
            offsets,
            sign,
            self.shift.unit,
        )?;
        let mut table = table;
        table.with_column(shifted)?;
        Ok(table)
    }
}

impl Transformer for DatetimeShiftTransformer {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn cast_column(&self, _direction: Direction) -> Option<&str> {
        Some(&self.datetime_column)
    }

    fn rewritten_columns(&self) -> Vec<&str> {
        vec![&self.datetime_column]
    }

    fn transform(&self, table: DataFrame, store: &mut MappingStore) -> Result<DataFrame> {
        if table.column(&self.datetime_column).is_err() {
            return Err(TransformError::ColumnNotFound {
                column: self.datetime_column.clone(),
            });
        }
        let (per_row, new_values, new_offsets) = self.offsets(&table, store, true)?;
        let table = self.shift_column(table, &per_row, 1)?;

        let key = self.store_key();
        let appended = store.append(&key, &self.reference, &key, &new_values, &new_offsets)?;
        debug!(
            column = self.datetime_column.as_str(),
            reference = self.reference.as_str(),
            unit = self.shift.unit.as_str(),
            appended,
            "timestamps shifted"
        );
        Ok(table)
    }

    fn reverse(&self, table: DataFrame, store: &MappingStore) -> Result<DataFrame> {
        let (per_row, _, _) = self.offsets(&table, store, false)?;
        let table = self.shift_column(table, &per_row, -1)?;
        debug!(
            column = self.datetime_column.as_str(),
            reference = self.reference.as_str(),
            "timestamps restored"
        );
        Ok(table)
    }
}

/// Shift every non-null value of `series` by `sign * offsets[row]` units.
///
/// Calendar units clamp to the end of the month (2024-01-31 plus one month
/// is 2024-02-29), and such values do not reverse exactly. Clamped values
/// are counted and reported with `warn!`.
pub fn shift_series(
    series: &Series,
    offsets: &[i64],
    sign: i64,
    unit: TimeShiftUnit,
) -> Result<Series> {
    let shifted = shift_values(series, offsets, sign, unit)?;
    if unit.is_calendar() {
        let clamped = month_end_clamps(series, &shifted)?;
        if clamped > 0 {
            warn!(
                column = series.name().as_str(),
                unit = unit.as_str(),
                clamped,
                "calendar shift clamped values to the end of the month; \
                 reversal will not restore their day of month"
            );
        }
    }
    Ok(shifted)
}

/// Number of non-null values whose day of month differs after shifting.
pub fn month_end_clamps(original: &Series, shifted: &Series) -> Result<usize> {
    let before = days_of_month(original)?;
    let after = days_of_month(shifted)?;
    Ok(before
        .iter()
        .zip(&after)
        .filter(|(before, after)| matches!((before, after), (Some(b), Some(a)) if b != a))
        .count())
}

fn days_of_month(series: &Series) -> Result<Vec<Option<u32>>> {
    let physical = series.to_physical_repr();
    match series.dtype() {
        DataType::Date => Ok(physical
            .i32()?
            .into_iter()
            .map(|days| {
                days.and_then(|days| days.checked_add(UNIX_EPOCH_DAYS_FROM_CE))
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .map(|date| date.day())
            })
            .collect()),
        DataType::Datetime(time_unit, _) => {
            let time_unit = *time_unit;
            Ok(physical
                .i64()?
                .into_iter()
                .map(|value| {
                    value
                        .and_then(|value| naive_timestamp(value, time_unit))
                        .map(|datetime| datetime.day())
                })
                .collect())
        }
        _ => Ok(Vec::new()),
    }
}

fn shift_values(
    series: &Series,
    offsets: &[i64],
    sign: i64,
    unit: TimeShiftUnit,
) -> Result<Series> {
    let name = series.name().clone();
    let overflow = |offset: i64| TransformError::OffsetOverflow {
        column: name.to_string(),
        offset,
        unit: unit.to_string(),
    };

    match series.dtype() {
        DataType::Datetime(time_unit, tz) => {
            let (time_unit, tz) = (*time_unit, tz.clone());
            let physical = series.to_physical_repr();
            let mut shifted = Vec::with_capacity(series.len());
            for (value, &offset) in physical.i64()?.into_iter().zip(offsets) {
                let offset = offset.checked_mul(sign).ok_or_else(|| overflow(offset))?;
                shifted.push(match value {
                    Some(value) => Some(
                        shift_timestamp(value, offset, unit, time_unit)
                            .ok_or_else(|| overflow(offset))?,
                    ),
                    None => None,
                });
            }
            Ok(Int64Chunked::from_iter_options(name.clone(), shifted.into_iter())
                .into_datetime(time_unit, tz)
                .into_series())
        }
        DataType::Date => {
            if unit == TimeShiftUnit::Hours {
                return Err(TransformError::UnsupportedDatetime {
                    column: name.to_string(),
                    dtype: series.dtype().to_string(),
                    hint: "date columns cannot be shifted by hours; use days or cast \
                           the column with value_cast \"datetime\""
                        .to_string(),
                });
            }
            let physical = series.to_physical_repr();
            let mut shifted = Vec::with_capacity(series.len());
            for (value, &offset) in physical.i32()?.into_iter().zip(offsets) {
                let offset = offset.checked_mul(sign).ok_or_else(|| overflow(offset))?;
                shifted.push(match value {
                    Some(days) => {
                        Some(shift_date(days, offset, unit).ok_or_else(|| overflow(offset))?)
                    }
                    None => None,
                });
            }
            Ok(Int32Chunked::from_iter_options(name.clone(), shifted.into_iter())
                .into_date()
                .into_series())
        }
        DataType::String => Err(TransformError::UnsupportedDatetime {
            column: name.to_string(),
            dtype: series.dtype().to_string(),
            hint: "parse the column first with value_cast \"datetime\"".to_string(),
        }),
        dtype => Err(TransformError::UnsupportedDatetime {
            column: name.to_string(),
            dtype: dtype.to_string(),
            hint: "only date and datetime columns can be shifted".to_string(),
        }),
    }
}

fn fixed_duration(offset: i64, unit: TimeShiftUnit) -> Option<Duration> {
    match unit {
        TimeShiftUnit::Hours => Duration::try_hours(offset),
        TimeShiftUnit::Days => Duration::try_days(offset),
        TimeShiftUnit::Weeks => Duration::try_weeks(offset),
        TimeShiftUnit::Months | TimeShiftUnit::Years => None,
    }
}

fn calendar_months(offset: i64, unit: TimeShiftUnit) -> Option<i64> {
    match unit {
        TimeShiftUnit::Months => Some(offset),
        TimeShiftUnit::Years => offset.checked_mul(12),
        _ => None,
    }
}

fn add_months_to_datetime(value: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        value.checked_add_months(magnitude)
    } else {
        value.checked_sub_months(magnitude)
    }
}

fn add_months_to_date(value: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        value.checked_add_months(magnitude)
    } else {
        value.checked_sub_months(magnitude)
    }
}

fn naive_timestamp(value: i64, time_unit: TimeUnit) -> Option<NaiveDateTime> {
    let datetime = match time_unit {
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(value),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value)?,
    };
    Some(datetime.naive_utc())
}

/// Shift a physical timestamp expressed in `time_unit`.
fn shift_timestamp(
    value: i64,
    offset: i64,
    unit: TimeShiftUnit,
    time_unit: TimeUnit,
) -> Option<i64> {
    if let Some(duration) = fixed_duration(offset, unit) {
        let delta = match time_unit {
            TimeUnit::Nanoseconds => duration.num_nanoseconds()?,
            TimeUnit::Microseconds => duration.num_microseconds()?,
            TimeUnit::Milliseconds => duration.num_milliseconds(),
        };
        return value.checked_add(delta);
    }

    let months = calendar_months(offset, unit)?;
    let datetime = naive_timestamp(value, time_unit)?;
    let shifted = add_months_to_datetime(datetime, months)?.and_utc();
    match time_unit {
        TimeUnit::Nanoseconds => shifted.timestamp_nanos_opt(),
        TimeUnit::Microseconds => Some(shifted.timestamp_micros()),
        TimeUnit::Milliseconds => Some(shifted.timestamp_millis()),
    }
}

/// Shift a date stored as days since the Unix epoch.
fn shift_date(days: i32, offset: i64, unit: TimeShiftUnit) -> Option<i32> {
    if let Some(duration) = fixed_duration(offset, unit) {
        let delta = i32::try_from(duration.num_days()).ok()?;
        return days.checked_add(delta);
    }
    let months = calendar_months(offset, unit)?;
    let date = NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)?;
    let shifted = add_months_to_date(date, months)?;
    shifted.num_days_from_ce().checked_sub(UNIX_EPOCH_DAYS_FROM_CE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_day_offset_matches_chrono() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch.num_days_from_ce(), UNIX_EPOCH_DAYS_FROM_CE);
    }

    #[test]
    fn fixed_units_shift_microseconds() {
        let hour = 3_600_000_000;
        assert_eq!(
            shift_timestamp(0, 2, TimeShiftUnit::Hours, TimeUnit::Microseconds),
            Some(2 * hour)
        );
        assert_eq!(
            shift_timestamp(0, -1, TimeShiftUnit::Weeks, TimeUnit::Milliseconds),
            Some(-7 * 24 * 3_600_000)
        );
    }

    #[test]
    fn calendar_units_clamp_to_month_end() {
        // 2024-01-31 + 1 month = 2024-02-29
        let jan_31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let days = jan_31.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE;
        let shifted = shift_date(days, 1, TimeShiftUnit::Months).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(shifted, expected.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE);
    }

    #[test]
    fn month_end_clamps_are_counted() {
        let dates = ["2024-01-31", "2024-01-15", "2023-03-31"]
            .map(|text| NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap());
        let days: Vec<i32> = dates
            .iter()
            .map(|date| date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
            .collect();
        let series = Series::new("d".into(), &days).cast(&DataType::Date).unwrap();

        let shifted = shift_series(&series, &[1, 1, 1], 1, TimeShiftUnit::Months).unwrap();
        // Jan 31 -> Feb 29 and Mar 31 -> Apr 30 are clamped; Jan 15 is not.
        assert_eq!(month_end_clamps(&series, &shifted).unwrap(), 2);
    }

    #[test]
    fn years_are_twelve_months() {
        let micros = DateTime::parse_from_rfc3339("2020-03-15T10:00:00Z")
            .unwrap()
            .timestamp_micros();
        let shifted = shift_timestamp(micros, -2, TimeShiftUnit::Years, TimeUnit::Microseconds);
        let expected = DateTime::parse_from_rfc3339("2018-03-15T10:00:00Z")
            .unwrap()
            .timestamp_micros();
        assert_eq!(shifted, Some(expected));
    }

    #[test]
    fn date_columns_reject_hours() {
        let series = Series::new("d".into(), &[0i32]).cast(&DataType::Date).unwrap();
        let err = shift_series(&series, &[1], 1, TimeShiftUnit::Hours).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedDatetime { .. }));
    }

    #[test]
    fn string_columns_suggest_value_cast() {
        let series = Series::new("d".into(), &["2024-01-01"]);
        let err = shift_series(&series, &[1], 1, TimeShiftUnit::Days).unwrap_err();
        assert!(err.to_string().contains("value_cast"));
    }
}
