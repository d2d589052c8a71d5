//! Run configuration deserialized from JSON.
//!
//! The configuration names the tables of a run, the transformers applied to
//! each table and where tables and mapping files are read from and written
//! to. Transformer parameters stay an untyped JSON object here; each
//! transformer kind decodes its own parameters when it is built.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level configuration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Run name, used in the status artifact file name.
    pub name: String,

    /// Global de-identification defaults.
    #[serde(default)]
    pub deid: DeidSettings,

    /// Input and output locations.
    pub io: IoConfig,

    /// Keep processing the remaining tables after one fails.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Tables in declaration order.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl RunConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Defaults shared by every transformer of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeidSettings {
    /// Default time-shift range for `datetime_shift` transformers.
    #[serde(default)]
    pub time_shift: TimeShiftSpec,
}

/// Unit and range of a random time shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeShiftSpec {
    pub unit: TimeShiftUnit,
    /// Inclusive lower bound of the offset.
    pub min: i64,
    /// Exclusive upper bound of the offset.
    pub max: i64,
    /// Seed for reproducible offsets; entropy is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TimeShiftSpec {
    fn default() -> Self {
        Self {
            unit: TimeShiftUnit::Days,
            min: -365,
            max: 365,
            seed: None,
        }
    }
}

/// Time unit an offset is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeShiftUnit {
    #[serde(alias = "shift_by_hours", alias = "random_hours")]
    Hours,
    #[serde(alias = "shift_by_days", alias = "random_days")]
    Days,
    #[serde(alias = "shift_by_weeks")]
    Weeks,
    #[serde(alias = "shift_by_months")]
    Months,
    #[serde(alias = "shift_by_years")]
    Years,
}

impl TimeShiftUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        }
    }

    /// Whether offsets in this unit follow the calendar rather than a fixed
    /// duration.
    pub const fn is_calendar(self) -> bool {
        matches!(self, Self::Months | Self::Years)
    }
}

impl fmt::Display for TimeShiftUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dtype a column is cast to before a transformer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueCast {
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "str")]
    String,
    Datetime,
}

impl fmt::Display for ValueCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

/// Input and output locations of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Directories holding `<table>.csv` files.
    pub data: PairedPaths,

    /// Directories holding one `<key>.csv` file per mapping entry.
    #[serde(default)]
    pub mappings: MappingPaths,

    /// Directory receiving the run status artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<PathBuf>,
}

impl IoConfig {
    /// Resolve relative paths against `base` (usually the config file's
    /// directory).
    pub fn rebase(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        join(&mut self.data.input);
        join(&mut self.data.output);
        if let Some(path) = self.mappings.input.as_mut() {
            join(path);
        }
        if let Some(path) = self.mappings.output.as_mut() {
            join(path);
        }
        if let Some(path) = self.runtime.as_mut() {
            join(path);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairedPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Mapping store locations; a run without `input` starts from an empty store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// One table and the transformers applied to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    /// Table name; also the CSV file stem.
    pub name: String,

    /// Tables that must be processed before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub transformers: Vec<TransformerSpec>,
}

/// Declaration of one transformer node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformerSpec {
    /// Registered transformer kind, e.g. `identifier`.
    pub kind: String,

    /// Node id, unique within the table. Defaults to `<kind>_<position>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Ids of nodes in the same table that must run first.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Kind-specific parameters.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Restrict the transformer to matching rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,

    /// Cast the target column before transforming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_cast: Option<ValueCast>,
}

impl TransformerSpec {
    /// The node id, falling back to `<kind>_<position>` within the table.
    pub fn node_id(&self, position: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}_{position}", self.kind),
        }
    }
}

/// A row-selection predicate with an optional description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
