//! Mapping entries and the mapping store shared across a run.
//!
//! A [`MappingEntry`] is a two-column frame pairing original values with
//! their surrogates (identifier entries) or with integer offsets (time-shift
//! entries). The [`MappingStore`] collects entries by key. Both are
//! append-only: existing rows are never rewritten, which is what keeps
//! earlier assignments stable across repeated runs.

use std::collections::{BTreeMap, HashSet};

use polars::prelude::*;

use crate::error::{ModelError, Result};
use crate::key::{KeyColumn, KeyFamily, KeyValue, key_series};

/// Suffix of the surrogate column of an identifier entry.
pub const DEID_SUFFIX: &str = "__deid";

/// Suffix of a time-shift entry's key and offset column.
pub const SHIFT_SUFFIX: &str = "_shift";

/// Surrogate column name for an identifier reference.
pub fn surrogate_column_name(reference: &str) -> String {
    format!("{reference}{DEID_SUFFIX}")
}

/// Store key (and offset column name) for a time-shift reference.
pub fn time_shift_key(reference: &str) -> String {
    format!("{reference}{SHIFT_SUFFIX}")
}

/// What an entry's surrogate column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// Sequential surrogate identifiers.
    Identifier,
    /// Integer time offsets.
    TimeShift,
}

/// One original-to-surrogate table.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    value_column: String,
    surrogate_column: String,
    frame: DataFrame,
}

impl MappingEntry {
    /// Create an empty entry whose value column has the given dtype.
    pub fn empty(
        value_column: impl Into<String>,
        surrogate_column: impl Into<String>,
        value_dtype: &DataType,
    ) -> Result<Self> {
        let value_column = value_column.into();
        let surrogate_column = surrogate_column.into();
        let frame = DataFrame::new(vec![
            Series::new_empty(value_column.as_str().into(), value_dtype).into_column(),
            Series::new_empty(surrogate_column.as_str().into(), &DataType::Int64).into_column(),
        ])?;
        Ok(Self {
            value_column,
            surrogate_column,
            frame,
        })
    }

    /// Wrap an existing frame, keeping only the two entry columns.
    ///
    /// Integer value columns are widened to `Int64`; the surrogate column must
    /// hold integers.
    pub fn from_frame(
        key: &str,
        frame: &DataFrame,
        value_column: impl Into<String>,
        surrogate_column: impl Into<String>,
    ) -> Result<Self> {
        let value_column = value_column.into();
        let surrogate_column = surrogate_column.into();

        for column in [&value_column, &surrogate_column] {
            if frame.column(column).is_err() {
                return Err(ModelError::MissingMappingColumn {
                    key: key.to_string(),
                    column: column.clone(),
                });
            }
        }

        let mut values = frame.column(&value_column)?.clone();
        if values.dtype().is_integer() && values.dtype() != &DataType::Int64 {
            values = values.cast(&DataType::Int64)?;
        }

        let surrogates = frame.column(&surrogate_column)?;
        let surrogates = match surrogates.dtype() {
            DataType::Int64 => surrogates.clone(),
            DataType::Null => surrogates.cast(&DataType::Int64)?,
            dtype if dtype.is_integer() => surrogates.cast(&DataType::Int64)?,
            dtype => {
                return Err(ModelError::NonIntegerSurrogate {
                    key: key.to_string(),
                    column: surrogate_column,
                    dtype: dtype.to_string(),
                });
            }
        };

        Ok(Self {
            frame: DataFrame::new(vec![values, surrogates])?,
            value_column,
            surrogate_column,
        })
    }

    /// Recognise a persisted frame by its store key.
    ///
    /// `{key}` + `{key}__deid` is an identifier entry; a key ending in
    /// `_shift` with columns `{reference}` + `{key}` is a time-shift entry.
    pub fn from_persisted(key: &str, frame: &DataFrame) -> Result<Self> {
        let has = |name: &str| frame.column(name).is_ok();

        if let Some(reference) = key.strip_suffix(SHIFT_SUFFIX)
            && has(reference)
            && has(key)
        {
            return Self::from_frame(key, frame, reference, key);
        }

        let surrogate = surrogate_column_name(key);
        if has(key) && has(&surrogate) {
            return Self::from_frame(key, frame, key, surrogate);
        }

        Err(ModelError::UnrecognisedLayout {
            key: key.to_string(),
            columns: frame
                .get_column_names()
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    pub fn surrogate_column(&self) -> &str {
        &self.surrogate_column
    }

    /// Whether the surrogate column holds offsets or identifiers.
    pub fn kind(&self) -> MappingKind {
        if self.surrogate_column.ends_with(SHIFT_SUFFIX) {
            MappingKind::TimeShift
        } else {
            MappingKind::Identifier
        }
    }

    /// Read-only view of the entry frame.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Dtype of the original-value column.
    pub fn value_dtype(&self) -> Result<DataType> {
        Ok(self.frame.column(&self.value_column)?.dtype().clone())
    }

    /// Original values decoded as keys.
    pub fn value_keys(&self) -> Result<KeyColumn> {
        KeyColumn::from_column(self.frame.column(&self.value_column)?)
    }

    /// Surrogate column decoded as integers.
    pub fn surrogates(&self) -> Result<Vec<Option<i64>>> {
        Ok(self
            .frame
            .column(&self.surrogate_column)?
            .i64()?
            .into_iter()
            .collect())
    }

    /// Largest surrogate assigned so far.
    pub fn max_surrogate(&self) -> Result<Option<i64>> {
        Ok(self.surrogates()?.into_iter().flatten().max())
    }

    /// Append new pairs. Values already present in the entry are rejected.
    fn append(&mut self, key: &str, values: &[KeyValue], surrogates: &[i64]) -> Result<usize> {
        if values.len() != surrogates.len() {
            return Err(ModelError::LengthMismatch {
                key: key.to_string(),
                values: values.len(),
                surrogates: surrogates.len(),
            });
        }
        let Some(first) = values.first() else {
            return Ok(0);
        };

        let family = match first {
            KeyValue::Int(_) => KeyFamily::Integer,
            KeyValue::Str(_) => KeyFamily::String,
        };
        let existing = self.value_keys()?;
        let stored_family = if self.is_empty() {
            family
        } else {
            existing.family()
        };
        let mixed = values.iter().any(|value| {
            !matches!(
                (value, stored_family),
                (KeyValue::Int(_), KeyFamily::Integer) | (KeyValue::Str(_), KeyFamily::String)
            )
        });
        if mixed {
            return Err(ModelError::KeyTypeMismatch {
                key: key.to_string(),
                expected: stored_family.to_string(),
                found: family.to_string(),
            });
        }

        let mut seen: HashSet<&KeyValue> = existing.values().iter().flatten().collect();
        for value in values {
            if !seen.insert(value) {
                return Err(ModelError::DuplicateValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        let wrapped: Vec<Option<KeyValue>> = values.iter().cloned().map(Some).collect();
        let rows = DataFrame::new(vec![
            key_series(&self.value_column, stored_family, &wrapped).into_column(),
            Series::new(self.surrogate_column.as_str().into(), surrogates).into_column(),
        ])?;

        // An empty entry adopts the dtype of its first rows.
        self.frame = if self.is_empty() {
            rows
        } else {
            self.frame.vstack(&rows)?
        };
        Ok(values.len())
    }
}

/// All mapping entries of a run, keyed by reference name.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    entries: BTreeMap<String, MappingEntry>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MappingEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappingEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Add a whole entry under a new key (used when loading persisted state).
    pub fn insert(&mut self, key: impl Into<String>, entry: MappingEntry) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(ModelError::DuplicateEntry { key });
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Append new pairs to the entry at `key`, creating it when absent.
    ///
    /// Returns the number of rows appended.
    pub fn append(
        &mut self,
        key: &str,
        value_column: &str,
        surrogate_column: &str,
        values: &[KeyValue],
        surrogates: &[i64],
    ) -> Result<usize> {
        if let Some(entry) = self.entries.get(key)
            && (entry.value_column != value_column || entry.surrogate_column != surrogate_column)
        {
            return Err(ModelError::ColumnMismatch {
                key: key.to_string(),
                expected_value: entry.value_column.clone(),
                expected_surrogate: entry.surrogate_column.clone(),
                value: value_column.to_string(),
                surrogate: surrogate_column.to_string(),
            });
        }
        if values.len() != surrogates.len() {
            return Err(ModelError::LengthMismatch {
                key: key.to_string(),
                values: values.len(),
                surrogates: surrogates.len(),
            });
        }
        let Some(first) = values.first() else {
            return Ok(0);
        };

        if !self.entries.contains_key(key) {
            let family = match first {
                KeyValue::Int(_) => KeyFamily::Integer,
                KeyValue::Str(_) => KeyFamily::String,
            };
            let entry = MappingEntry::empty(value_column, surrogate_column, &family.storage_dtype())?;
            self.entries.insert(key.to_string(), entry);
        }

        match self.entries.get_mut(key) {
            Some(entry) => entry.append(key, values, surrogates),
            None => Ok(0),
        }
    }
}
