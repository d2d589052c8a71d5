//! Error types for transformer construction and execution.

use thiserror::Error;

use crate::merge::MergeDiagnosis;

/// Errors raised while building transformers from configuration.
///
/// These are reported before any table is touched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The transformer kind is not registered.
    #[error("unknown transformer kind '{kind}'; expected one of: {known}")]
    UnknownKind {
        /// The requested kind.
        kind: String,
        /// Comma separated list of registered kinds.
        known: String,
    },

    /// Parameters could not be decoded for the kind.
    #[error("invalid parameters for '{node}' ({kind}): {message}")]
    InvalidParams {
        /// Node id.
        node: String,
        /// Transformer kind.
        kind: String,
        /// Decoder message.
        message: String,
    },

    /// The time-shift range is empty.
    #[error("time shift for '{node}' needs min < max, got min={min} max={max}")]
    InvalidShiftRange {
        node: String,
        min: i64,
        max: i64,
    },

    /// The filter condition failed to parse.
    #[error("filter of '{node}' is invalid: {source}")]
    Filter {
        /// Node id.
        node: String,
        /// Parser error.
        #[source]
        source: FilterError,
    },

    /// The filter reads a column the node itself rewrites, so reverse would
    /// select different rows than transform did.
    #[error(
        "filter of '{node}' reads column '{column}', which the node rewrites; \
         filter on a column the node leaves unchanged"
    )]
    FilterOnRewrittenColumn { node: String, column: String },

    /// The kind does not support an option that was configured.
    #[error("'{node}' ({kind}) does not support '{option}'")]
    UnsupportedOption {
        node: String,
        kind: String,
        option: &'static str,
    },
}

/// Structural errors in the dependency graph of a pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Two nodes share an id.
    #[error("duplicate node id '{node}'")]
    DuplicateNode { node: String },

    /// A node depends on an id that is not part of the pipeline.
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    /// The dependencies contain a cycle.
    #[error("dependency cycle between nodes: {}", .nodes.join(", "))]
    DependencyCycle {
        /// Every node that could not be ordered.
        nodes: Vec<String>,
    },
}

/// Errors from parsing or evaluating a row filter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilterError {
    /// The condition is not valid predicate syntax.
    #[error("syntax error at offset {offset} in '{condition}': {message}")]
    Syntax {
        condition: String,
        /// Byte offset of the offending token.
        offset: usize,
        message: String,
    },

    /// The condition names a column the table does not have.
    #[error("filter column '{column}' not found; available columns: {available}")]
    UnknownColumn {
        column: String,
        /// Comma separated list of the table's columns.
        available: String,
    },

    /// The condition did not evaluate to a boolean mask of the table length.
    #[error("filter '{condition}' produced {found}, expected a boolean mask of {expected} rows")]
    InvalidMask {
        condition: String,
        expected: usize,
        found: String,
    },
}

/// Errors raised while running a transformer over a table.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A value-to-mapping join returned the wrong number of rows.
    #[error(transparent)]
    Merge(#[from] MergeDiagnosis),

    /// A required column is missing from the table.
    #[error("column '{column}' not found in table")]
    ColumnNotFound { column: String },

    /// A key column contains nulls, which never receive a mapping.
    #[error("column '{column}' contains {count} null value(s); nulls cannot be mapped")]
    NullValues { column: String, count: usize },

    /// A key column has a dtype that cannot be matched.
    #[error(
        "column '{column}' has dtype {dtype}; identifier keys must be integers or strings \
         (set value_cast to normalise it)"
    )]
    UnsupportedKeyType { column: String, dtype: String },

    /// The datetime column cannot be shifted.
    #[error("column '{column}' with dtype {dtype} cannot be shifted: {hint}")]
    UnsupportedDatetime {
        column: String,
        dtype: String,
        hint: String,
    },

    /// Reversal needs an entry that is not in the store.
    #[error("mapping store has no entry '{key}'; nothing to reverse with")]
    MissingEntry { key: String },

    /// A value cast cannot be applied to the column's dtype.
    #[error("cannot cast column '{column}' from {from} to {to}")]
    Cast {
        column: String,
        from: String,
        to: String,
    },

    /// A float surrogate column holds a value that is not a whole number.
    #[error("column '{column}' holds surrogate {value}, which is not a whole number")]
    NonIntegralSurrogate { column: String, value: f64 },

    /// Applying an offset left the representable range.
    #[error("shifting column '{column}' by {offset} {unit} overflows")]
    OffsetOverflow {
        column: String,
        offset: i64,
        unit: String,
    },

    /// Polars DataFrame operation error.
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Mapping store error.
    #[error(transparent)]
    Model(#[from] deid_model::ModelError),
}

/// Result type alias for transformer operations.
pub type Result<T> = std::result::Result<T, TransformError>;
