//! Error types for the de-identification data model.

use thiserror::Error;

/// Errors raised while building or extending mapping entries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A persisted mapping frame is missing one of its two columns.
    #[error("mapping entry '{key}' is missing column '{column}'")]
    MissingMappingColumn {
        /// Store key of the entry.
        key: String,
        /// The column that was expected.
        column: String,
    },

    /// A persisted mapping frame does not follow either known column layout.
    #[error(
        "mapping '{key}' has columns [{columns}]; expected '{key}' with '{key}__deid', \
         or '<reference>' with '<reference>_shift'"
    )]
    UnrecognisedLayout {
        /// Store key (file stem) of the entry.
        key: String,
        /// Comma separated list of the columns found.
        columns: String,
    },

    /// Surrogate columns must hold integers.
    #[error("surrogate column '{column}' of mapping '{key}' has dtype {dtype}, expected integers")]
    NonIntegerSurrogate {
        /// Store key of the entry.
        key: String,
        /// The surrogate column name.
        column: String,
        /// The dtype that was found.
        dtype: String,
    },

    /// A key column holds a dtype that cannot be used for matching.
    #[error(
        "column '{column}' has dtype {dtype} which cannot be used as a mapping key; \
         cast it to integer or string first"
    )]
    UnsupportedKeyType {
        /// The column name.
        column: String,
        /// The offending dtype.
        dtype: String,
    },

    /// An append would mix two different column layouts in one entry.
    #[error(
        "mapping '{key}' stores columns ('{expected_value}', '{expected_surrogate}') \
         but an append used ('{value}', '{surrogate}')"
    )]
    ColumnMismatch {
        /// Store key of the entry.
        key: String,
        /// Value column of the existing entry.
        expected_value: String,
        /// Surrogate column of the existing entry.
        expected_surrogate: String,
        /// Value column requested by the append.
        value: String,
        /// Surrogate column requested by the append.
        surrogate: String,
    },

    /// Appended values do not share the entry's key dtype.
    #[error("mapping '{key}' stores {expected} keys, cannot append {found} keys")]
    KeyTypeMismatch {
        /// Store key of the entry.
        key: String,
        /// Dtype stored in the entry.
        expected: String,
        /// Dtype of the appended values.
        found: String,
    },

    /// Appends may only add values that are not yet mapped.
    #[error("mapping '{key}' already contains value {value}")]
    DuplicateValue {
        /// Store key of the entry.
        key: String,
        /// The value that was already present.
        value: String,
    },

    /// Value and surrogate slices have different lengths.
    #[error("mapping '{key}' append has {values} values but {surrogates} surrogates")]
    LengthMismatch {
        /// Store key of the entry.
        key: String,
        /// Number of values.
        values: usize,
        /// Number of surrogates.
        surrogates: usize,
    },

    /// An entry of the same key is already present in the store.
    #[error("mapping store already contains an entry for '{key}'")]
    DuplicateEntry {
        /// The duplicated key.
        key: String,
    },

    /// Polars DataFrame operation error.
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
