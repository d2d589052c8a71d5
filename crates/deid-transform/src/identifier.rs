//! Sequential surrogate identifiers.
//!
//! Each distinct value of the column is replaced by an integer surrogate.
//! Values seen before (in this table, an earlier table or an earlier run
//! loaded from disk) keep their surrogate; new values continue the sequence
//! after the largest surrogate already assigned under the same reference.

use std::collections::HashSet;

use deid_model::{KeyColumn, KeyValue, MappingStore, key_series, surrogate_column_name};
use polars::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TransformError};
use crate::merge::{key_column, lookup};
use crate::transformer::{Direction, Transformer};

pub const KIND: &str = "identifier";

/// Parameters of an `identifier` node.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentifierParams {
    /// Table column to pseudonymise.
    pub column: String,
    /// Store entry shared by every column in the same identifier space.
    /// Defaults to `column`.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IdentifierTransformer {
    column: String,
    reference: String,
}

impl IdentifierTransformer {
    pub fn new(column: impl Into<String>, reference: Option<String>) -> Self {
        let column = column.into();
        let reference = reference.unwrap_or_else(|| column.clone());
        Self { column, reference }
    }

    pub fn from_params(params: IdentifierParams) -> Self {
        Self::new(params.column, params.reference)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl Transformer for IdentifierTransformer {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn cast_column(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Forward => Some(&self.column),
            Direction::Reverse => None,
        }
    }

    fn rewritten_columns(&self) -> Vec<&str> {
        vec![&self.column]
    }

    fn transform(&self, table: DataFrame, store: &mut MappingStore) -> Result<DataFrame> {
        let source = key_column(&table, &self.column)?;
        let surrogate_column = surrogate_column_name(&self.reference);

        let (existing, surrogates) = match store.get(&self.reference) {
            Some(entry) => (entry.value_keys()?, entry.surrogates()?),
            None => (
                KeyColumn::from_values(&self.reference, source.family(), Vec::new()),
                Vec::new(),
            ),
        };
        let next = surrogates.iter().flatten().max().map_or(1, |max| max + 1);

        // A family mismatch leaves nothing new to assign; the join below then
        // reports the mismatch.
        let compatible = existing.is_empty() || existing.family() == source.family();
        let new_values: Vec<KeyValue> = if compatible {
            let known: HashSet<&KeyValue> = existing.values().iter().flatten().collect();
            source
                .distinct()
                .into_iter()
                .filter(|value| !known.contains(value))
                .collect()
        } else {
            Vec::new()
        };
        let new_surrogates: Vec<i64> = (next..).take(new_values.len()).collect();

        let family = if existing.is_empty() {
            source.family()
        } else {
            existing.family()
        };
        let mut keys = existing.values().to_vec();
        keys.extend(new_values.iter().cloned().map(Some));
        let mut outputs = surrogates;
        outputs.extend(new_surrogates.iter().copied().map(Some));
        let mapping = KeyColumn::from_values(&self.reference, family, keys);

        let replaced: Vec<Option<i64>> = lookup(&source, &mapping, &outputs)?;
        let mut table = table;
        table.with_column(Series::new(self.column.as_str().into(), replaced))?;

        let appended = store.append(
            &self.reference,
            &self.reference,
            &surrogate_column,
            &new_values,
            &new_surrogates,
        )?;
        debug!(
            column = self.column.as_str(),
            reference = self.reference.as_str(),
            distinct = source.distinct().len(),
            appended,
            "identifiers assigned"
        );
        Ok(table)
    }

    fn reverse(&self, table: DataFrame, store: &MappingStore) -> Result<DataFrame> {
        let Some(entry) = store.get(&self.reference) else {
            return Err(TransformError::MissingEntry {
                key: self.reference.clone(),
            });
        };
        let Ok(column) = table.column(&self.column) else {
            return Err(TransformError::ColumnNotFound {
                column: self.column.clone(),
            });
        };

        // Surrogates read back from text, or widened while reassembling a
        // filtered table, arrive as strings or floats.
        let parsed = match column.dtype() {
            DataType::String => Some(column.strict_cast(&DataType::Int64).map_err(|_| {
                TransformError::Cast {
                    column: self.column.clone(),
                    from: column.dtype().to_string(),
                    to: DataType::Int64.to_string(),
                }
            })?),
            dtype if dtype.is_float() => {
                let values = column.cast(&DataType::Float64)?;
                if let Some(value) = values
                    .f64()?
                    .into_iter()
                    .flatten()
                    .find(|value| value.fract() != 0.0)
                {
                    return Err(TransformError::NonIntegralSurrogate {
                        column: self.column.clone(),
                        value,
                    });
                }
                Some(values.cast(&DataType::Int64)?)
            }
            _ => None,
        };
        let mut table = table;
        if let Some(parsed) = parsed {
            table.with_column(parsed)?;
        }

        let source = key_column(&table, &self.column)?;
        let mapping = KeyColumn::from_column(entry.frame().column(entry.surrogate_column())?)?;
        let originals = entry.value_keys()?;
        let restored = lookup(&source, &mapping, originals.values())?;

        table.with_column(key_series(&self.column, originals.family(), &restored))?;
        debug!(
            column = self.column.as_str(),
            reference = self.reference.as_str(),
            rows = restored.len(),
            "identifiers restored"
        );
        Ok(table)
    }
}
