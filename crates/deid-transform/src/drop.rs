//! Column removal.

use deid_model::MappingStore;
use polars::prelude::DataFrame;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TransformError};
use crate::transformer::{Direction, Transformer};

pub const KIND: &str = "column_drop";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDropParams {
    pub column: String,
}

/// Removes a column. Nothing is recorded, so reversal leaves the table as is.
#[derive(Debug, Clone)]
pub struct ColumnDropTransformer {
    column: String,
}

impl ColumnDropTransformer {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Transformer for ColumnDropTransformer {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn cast_column(&self, _direction: Direction) -> Option<&str> {
        None
    }

    fn rewritten_columns(&self) -> Vec<&str> {
        vec![&self.column]
    }

    fn transform(&self, table: DataFrame, _store: &mut MappingStore) -> Result<DataFrame> {
        if table.column(&self.column).is_err() {
            return Err(TransformError::ColumnNotFound {
                column: self.column.clone(),
            });
        }
        debug!(column = self.column.as_str(), "column dropped");
        Ok(table.drop(&self.column)?)
    }

    fn reverse(&self, table: DataFrame, _store: &MappingStore) -> Result<DataFrame> {
        Ok(table)
    }
}
