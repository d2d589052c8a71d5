//! Typed key values used to match table columns against mapping entries.
//!
//! Matching is done on a small closed set of key families. Every integer
//! dtype is widened to `i64`, strings are compared byte-for-byte, and values
//! of different families never compare equal. Anything else has to be cast
//! before it can take part in a merge.

use std::collections::HashSet;
use std::fmt;

use polars::prelude::*;

use crate::error::{ModelError, Result};

/// The family a key column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// Any integer dtype, compared as `i64`.
    Integer,
    /// UTF-8 strings.
    String,
}

impl KeyFamily {
    /// The dtype a key of this family is stored with.
    pub fn storage_dtype(self) -> DataType {
        match self {
            Self::Integer => DataType::Int64,
            Self::String => DataType::String,
        }
    }

    /// Classify a dtype, if it can be used as a key.
    pub fn of(dtype: &DataType) -> Option<Self> {
        if dtype.is_integer() {
            Some(Self::Integer)
        } else if matches!(dtype, DataType::String | DataType::Null) {
            Some(Self::String)
        } else {
            None
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::String => f.write_str("string"),
        }
    }
}

/// A single non-null key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "'{value}'"),
        }
    }
}

/// A column decoded into key values, keeping its original name and dtype.
#[derive(Debug, Clone)]
pub struct KeyColumn {
    name: String,
    dtype: DataType,
    family: KeyFamily,
    values: Vec<Option<KeyValue>>,
}

impl KeyColumn {
    /// Decode a polars column into key values.
    pub fn from_column(column: &Column) -> Result<Self> {
        let name = column.name().to_string();
        let dtype = column.dtype().clone();
        let Some(family) = KeyFamily::of(&dtype) else {
            return Err(ModelError::UnsupportedKeyType {
                column: name,
                dtype: dtype.to_string(),
            });
        };

        let values = match (&dtype, family) {
            (DataType::Null, _) => vec![None; column.len()],
            (_, KeyFamily::Integer) => {
                let widened = column.cast(&DataType::Int64)?;
                widened
                    .i64()?
                    .into_iter()
                    .map(|value| value.map(KeyValue::Int))
                    .collect()
            }
            (_, KeyFamily::String) => column
                .str()?
                .into_iter()
                .map(|value| value.map(|s| KeyValue::Str(s.to_string())))
                .collect(),
        };

        Ok(Self {
            name,
            dtype,
            family,
            values,
        })
    }

    /// Build a key column from values already known to be of `family`.
    pub fn from_values(
        name: impl Into<String>,
        family: KeyFamily,
        values: Vec<Option<KeyValue>>,
    ) -> Self {
        Self {
            name: name.into(),
            dtype: family.storage_dtype(),
            family,
            values,
        }
    }

    /// Column name the keys were read from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original dtype of the column.
    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// Key family of the column.
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Row-aligned key values; `None` marks a null.
    pub fn values(&self) -> &[Option<KeyValue>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_none()).count()
    }

    /// Distinct non-null values in order of first appearance.
    pub fn distinct(&self) -> Vec<KeyValue> {
        let mut seen = HashSet::with_capacity(self.values.len());
        self.values
            .iter()
            .flatten()
            .filter(|value| seen.insert(*value))
            .cloned()
            .collect()
    }
}

/// Build a series of the given key family from key values.
///
/// Values of the other family are written as null; callers only pass values
/// that came from a column of `family`.
pub fn key_series(name: &str, family: KeyFamily, values: &[Option<KeyValue>]) -> Series {
    match family {
        KeyFamily::Integer => {
            let ints: Vec<Option<i64>> = values
                .iter()
                .map(|value| match value {
                    Some(KeyValue::Int(v)) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), ints)
        }
        KeyFamily::String => {
            let strings: Vec<Option<String>> = values
                .iter()
                .map(|value| match value {
                    Some(KeyValue::Str(v)) => Some(v.clone()),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), strings)
        }
    }
}
