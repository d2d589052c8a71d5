//! Joining key columns against mapping entries, and diagnosing bad joins.
//!
//! Every transformer replaces values by looking them up in a mapping entry.
//! The lookup behaves like an inner join between the source column and the
//! entry: a correct join returns exactly one row per source row. When the row
//! count is off, [`validate_merge`] explains why so the message points at the
//! actual fix (a value cast, a corrupt mapping, a missing mapping file).

use std::collections::{HashMap, HashSet};
use std::fmt;

use deid_model::{KeyColumn, KeyValue, ModelError};
use polars::prelude::DataFrame;
use thiserror::Error;
use tracing::debug;

use crate::error::TransformError;

/// Number of offending values quoted in a diagnosis.
pub const SAMPLE_LIMIT: usize = 10;

/// Why a value-to-mapping join did not return one row per source row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MergeDiagnosis {
    /// The two key columns belong to different key families.
    #[error(
        "type mismatch joining '{source_column}' ({source_dtype}) with mapping column \
         '{mapping_column}' ({mapping_dtype}); unmatched values: {sample}. \
         Set value_cast on the transformer so both sides share a type"
    )]
    TypeMismatch {
        source_column: String,
        source_dtype: String,
        mapping_column: String,
        mapping_dtype: String,
        sample: Sample,
    },

    /// Source values have no mapping.
    #[error(
        "{count} value(s) of '{source_column}' have no mapping in '{mapping_column}': {sample}"
    )]
    MissingMappings {
        source_column: String,
        mapping_column: String,
        count: usize,
        sample: Sample,
    },

    /// The mapping maps one value more than once.
    #[error(
        "mapping column '{mapping_column}' contains {count} duplicated key(s): {sample}; \
         the mapping is corrupt"
    )]
    DuplicateMappingKeys {
        mapping_column: String,
        count: usize,
        sample: Sample,
    },

    /// The source repeats values the join expanded.
    #[error("source column '{source_column}' contains {count} duplicated value(s): {sample}")]
    DuplicateSourceValues {
        source_column: String,
        count: usize,
        sample: Sample,
    },

    /// More rows than expected without an identifiable cause.
    #[error(
        "joining '{source_column}' with '{mapping_column}' returned {actual} rows, \
         expected {expected}"
    )]
    UnexpectedExtraRows {
        source_column: String,
        mapping_column: String,
        expected: usize,
        actual: usize,
    },
}

/// A bounded list of offending values, rendered for messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    values: Vec<String>,
    total: usize,
}

impl Sample {
    fn collect<'a>(values: impl IntoIterator<Item = &'a KeyValue>) -> Self {
        let mut sample = Self::default();
        for value in values {
            if sample.values.len() < SAMPLE_LIMIT {
                sample.values.push(value.to_string());
            }
            sample.total += 1;
        }
        sample
    }

    /// The quoted values, at most [`SAMPLE_LIMIT`].
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Number of offending values, including the ones not quoted.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.values.join(", "))?;
        if self.total > self.values.len() {
            write!(f, ", ... {} more", self.total - self.values.len())?;
        }
        f.write_str("]")
    }
}

/// Diagnose a join of `source` against `mapping` that returned `joined_rows`.
///
/// Returns `Ok(())` when the join returned one row per source row and every
/// source value was matched.
pub fn validate_merge(
    source: &KeyColumn,
    mapping: &KeyColumn,
    joined_rows: usize,
) -> Result<(), MergeDiagnosis> {
    let expected = source.len();
    let compatible = source.family() == mapping.family();
    let mapped: HashSet<&KeyValue> = mapping.values().iter().flatten().collect();
    let unmatched: Vec<KeyValue> = source
        .distinct()
        .into_iter()
        .filter(|value| !compatible || !mapped.contains(value))
        .collect();

    if joined_rows > expected {
        let mapping_duplicates = duplicates(mapping);
        if !mapping_duplicates.is_empty() {
            return Err(MergeDiagnosis::DuplicateMappingKeys {
                mapping_column: mapping.name().to_string(),
                count: mapping_duplicates.len(),
                sample: Sample::collect(&mapping_duplicates),
            });
        }
        let source_duplicates = duplicates(source);
        if !source_duplicates.is_empty() {
            return Err(MergeDiagnosis::DuplicateSourceValues {
                source_column: source.name().to_string(),
                count: source_duplicates.len(),
                sample: Sample::collect(&source_duplicates),
            });
        }
        return Err(MergeDiagnosis::UnexpectedExtraRows {
            source_column: source.name().to_string(),
            mapping_column: mapping.name().to_string(),
            expected,
            actual: joined_rows,
        });
    }

    if joined_rows < expected || !unmatched.is_empty() {
        if !compatible {
            return Err(MergeDiagnosis::TypeMismatch {
                source_column: source.name().to_string(),
                source_dtype: source.dtype().to_string(),
                mapping_column: mapping.name().to_string(),
                mapping_dtype: mapping.dtype().to_string(),
                sample: Sample::collect(&unmatched),
            });
        }
        return Err(MergeDiagnosis::MissingMappings {
            source_column: source.name().to_string(),
            mapping_column: mapping.name().to_string(),
            count: unmatched.len() + usize::from(source.null_count() > 0),
            sample: Sample::collect(&unmatched),
        });
    }

    Ok(())
}

/// Look every source value up in `mapping`, returning the row-aligned
/// `outputs` of the matched mapping rows.
///
/// `outputs` is aligned with the mapping rows. Any join that does not yield
/// exactly one match per source row is rejected with a [`MergeDiagnosis`].
pub fn lookup<T: Clone>(
    source: &KeyColumn,
    mapping: &KeyColumn,
    outputs: &[T],
) -> Result<Vec<T>, MergeDiagnosis> {
    let mut index: HashMap<&KeyValue, Vec<usize>> = HashMap::new();
    if source.family() == mapping.family() {
        for (row, value) in mapping.values().iter().enumerate() {
            if let Some(value) = value {
                index.entry(value).or_default().push(row);
            }
        }
    }

    let mut joined_rows = 0usize;
    let mut exact = true;
    let mut matched = Vec::with_capacity(source.len());
    for value in source.values() {
        let rows = value
            .as_ref()
            .and_then(|value| index.get(value))
            .map_or(&[][..], Vec::as_slice);
        joined_rows += rows.len();
        match rows {
            [row] => {
                if let Some(output) = outputs.get(*row) {
                    matched.push(output.clone());
                }
            }
            _ => exact = false,
        }
    }

    if exact && matched.len() == source.len() {
        return Ok(matched);
    }

    debug!(
        source = source.name(),
        mapping = mapping.name(),
        expected = source.len(),
        joined_rows,
        "join row count mismatch"
    );
    validate_merge(source, mapping, joined_rows)?;
    Err(MergeDiagnosis::UnexpectedExtraRows {
        source_column: source.name().to_string(),
        mapping_column: mapping.name().to_string(),
        expected: source.len(),
        actual: joined_rows,
    })
}

/// Read `name` from `table` as a key column, rejecting nulls.
pub(crate) fn key_column(table: &DataFrame, name: &str) -> Result<KeyColumn, TransformError> {
    let Ok(column) = table.column(name) else {
        return Err(TransformError::ColumnNotFound {
            column: name.to_string(),
        });
    };
    let nulls = column.null_count();
    if nulls > 0 {
        return Err(TransformError::NullValues {
            column: name.to_string(),
            count: nulls,
        });
    }
    KeyColumn::from_column(column).map_err(|err| match err {
        ModelError::UnsupportedKeyType { column, dtype } => {
            TransformError::UnsupportedKeyType { column, dtype }
        }
        other => other.into(),
    })
}

/// Values that appear more than once, in order of first repetition.
fn duplicates(column: &KeyColumn) -> Vec<KeyValue> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut repeated = Vec::new();
    for value in column.values().iter().flatten() {
        if !seen.insert(value) && reported.insert(value) {
            repeated.push(value.clone());
        }
    }
    repeated
}
