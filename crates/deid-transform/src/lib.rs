//! Transformer pipeline for tabular de-identification.
//!
//! A [`TablePipeline`] holds [`TransformerNode`]s with declared dependencies
//! and runs them in topological order over a polars [`DataFrame`], threading
//! a [`MappingStore`] through every node. Nodes can be scoped to a subset of
//! rows with a [`RowFilter`]. Each lookup against the store goes through
//! [`merge::lookup`], which explains joins that return the wrong number of
//! rows.
//!
//! [`DataFrame`]: polars::prelude::DataFrame
//! [`MappingStore`]: deid_model::MappingStore

pub mod cast;
pub mod drop;
pub mod error;
pub mod filter;
pub mod graph;
pub mod identifier;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod temporal;
pub mod transformer;

pub use cast::apply_value_cast;
pub use drop::ColumnDropTransformer;
pub use error::{ConfigError, FilterError, PipelineError, Result, TransformError};
pub use filter::{Predicate, RowFilter, Selection, apply_filter, undo_filter};
pub use graph::topological_order;
pub use identifier::IdentifierTransformer;
pub use merge::{MergeDiagnosis, validate_merge};
pub use pipeline::TablePipeline;
pub use registry::{TransformerFactory, TransformerRegistry, build_default_registry, default_registry};
pub use temporal::DatetimeShiftTransformer;
pub use transformer::{Direction, Transformer, TransformerNode};
