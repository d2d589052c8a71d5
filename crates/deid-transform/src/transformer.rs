//! The transformer trait and the pipeline node wrapping it.

use std::fmt;

use deid_model::{MappingStore, ValueCast};
use polars::prelude::DataFrame;
use tracing::debug;

use crate::cast::apply_value_cast;
use crate::error::Result;
use crate::filter::{RowFilter, apply_filter, undo_filter};

/// Which way a node is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A reversible column transformation backed by the mapping store.
///
/// `transform` may append new rows to the store; `reverse` only reads it and
/// never derives new mappings.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Registered kind name, e.g. `identifier`.
    fn kind(&self) -> &'static str;

    /// Column a configured value cast applies to when running in `direction`.
    fn cast_column(&self, direction: Direction) -> Option<&str>;

    /// Columns whose values `transform` rewrites. A row filter must not read
    /// them: reverse evaluates the filter on the rewritten table.
    fn rewritten_columns(&self) -> Vec<&str>;

    /// Apply the transformation, recording new mappings in `store`.
    fn transform(&self, table: DataFrame, store: &mut MappingStore) -> Result<DataFrame>;

    /// Undo a previous `transform` using the mappings in `store`.
    fn reverse(&self, table: DataFrame, store: &MappingStore) -> Result<DataFrame>;
}

/// A transformer with its id, dependencies and row scope.
#[derive(Debug)]
pub struct TransformerNode {
    id: String,
    depends_on: Vec<String>,
    filter: Option<RowFilter>,
    value_cast: Option<ValueCast>,
    body: Box<dyn Transformer>,
}

impl TransformerNode {
    pub fn new(id: impl Into<String>, body: Box<dyn Transformer>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            filter: None,
            value_cast: None,
            body,
        }
    }

    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Columns the body rewrites.
    pub fn rewritten_columns(&self) -> Vec<&str> {
        self.body.rewritten_columns()
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_value_cast(mut self, cast: ValueCast) -> Self {
        self.value_cast = Some(cast);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    pub fn filter(&self) -> Option<&RowFilter> {
        self.filter.as_ref()
    }

    pub fn value_cast(&self) -> Option<ValueCast> {
        self.value_cast
    }

    /// Run the transformer: filter, cast, transform, reassemble.
    pub fn transform(&self, table: DataFrame, store: &mut MappingStore) -> Result<DataFrame> {
        let Some(filter) = &self.filter else {
            let table = self.cast(table, Direction::Forward)?;
            return self.body.transform(table, store);
        };

        let (subset, selection) = apply_filter(&table, filter)?;
        let subset = self.cast(subset, Direction::Forward)?;
        let transformed = self.body.transform(subset, store)?;
        debug!(node = self.id.as_str(), rows = selection.len(), "reassembling filtered rows");
        undo_filter(&table, transformed, &selection)
    }

    /// Run the inverse on the same row scope.
    pub fn reverse(&self, table: DataFrame, store: &MappingStore) -> Result<DataFrame> {
        let Some(filter) = &self.filter else {
            let table = self.cast(table, Direction::Reverse)?;
            return self.body.reverse(table, store);
        };

        let (subset, selection) = apply_filter(&table, filter)?;
        let subset = self.cast(subset, Direction::Reverse)?;
        let restored = self.body.reverse(subset, store)?;
        undo_filter(&table, restored, &selection)
    }

    fn cast(&self, table: DataFrame, direction: Direction) -> Result<DataFrame> {
        match (self.value_cast, self.body.cast_column(direction)) {
            (Some(cast), Some(column)) => apply_value_cast(table, column, cast),
            _ => Ok(table),
        }
    }
}
