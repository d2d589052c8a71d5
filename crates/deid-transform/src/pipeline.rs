//! Dependency-ordered transformer pipeline for one table.
//!
//! Nodes are added while the pipeline is built. The execution order is the
//! topological order of their declared dependencies, computed before any node
//! runs, so a pipeline with a cycle fails without touching the table or the
//! mapping store.
//!
//! # Example
//!
//! ```ignore
//! use deid_transform::{IdentifierTransformer, TablePipeline, TransformerNode};
//!
//! let mut pipeline = TablePipeline::new("patients");
//! pipeline.add(TransformerNode::new(
//!     "patient_id",
//!     Box::new(IdentifierTransformer::new("patient_id", None)),
//! ))?;
//! let table = pipeline.transform(table, &mut store)?;
//! ```

use deid_model::MappingStore;
use polars::prelude::DataFrame;
use tracing::{debug, info_span};

use crate::error::{PipelineError, Result};
use crate::graph::topological_order;
use crate::transformer::TransformerNode;

/// The transformers applied to one table.
#[derive(Debug)]
pub struct TablePipeline {
    table: String,
    nodes: Vec<TransformerNode>,
}

impl TablePipeline {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            nodes: Vec::new(),
        }
    }

    /// Add a node. Ids must be unique within the pipeline.
    pub fn add(&mut self, node: TransformerNode) -> std::result::Result<(), PipelineError> {
        if self.nodes.iter().any(|existing| existing.id() == node.id()) {
            return Err(PipelineError::DuplicateNode {
                node: node.id().to_string(),
            });
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn nodes(&self) -> &[TransformerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in execution order.
    pub fn execution_order(&self) -> std::result::Result<Vec<&str>, PipelineError> {
        Ok(self
            .ordered()?
            .into_iter()
            .map(|node| node.id())
            .collect())
    }

    fn ordered(&self) -> std::result::Result<Vec<&TransformerNode>, PipelineError> {
        let graph: Vec<(&str, Vec<&str>)> = self
            .nodes
            .iter()
            .map(|node| {
                let deps = node.depends_on().iter().map(String::as_str).collect();
                (node.id(), deps)
            })
            .collect();
        let order = topological_order(&graph)?;
        Ok(order.into_iter().map(|index| &self.nodes[index]).collect())
    }

    /// Run every node in order, threading the table and the store through.
    pub fn transform(&self, table: DataFrame, store: &mut MappingStore) -> Result<DataFrame> {
        let order = self.ordered()?;
        let mut table = table;
        for node in order {
            let span = info_span!(
                "transformer",
                table = self.table.as_str(),
                node = node.id(),
                kind = node.kind()
            );
            let _guard = span.enter();
            debug!(rows = table.height(), "running node");
            table = node.transform(table, store)?;
        }
        Ok(table)
    }

    /// Undo every node, last node first.
    pub fn reverse(&self, table: DataFrame, store: &MappingStore) -> Result<DataFrame> {
        let order = self.ordered()?;
        let mut table = table;
        for node in order.into_iter().rev() {
            let span = info_span!(
                "transformer",
                table = self.table.as_str(),
                node = node.id(),
                kind = node.kind()
            );
            let _guard = span.enter();
            debug!(rows = table.height(), "reversing node");
            table = node.reverse(table, store)?;
        }
        Ok(table)
    }
}
