//! Per-table outcomes of a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Success,
    Error,
    /// Not attempted because a table it depends on did not succeed.
    Skipped,
}

impl TableStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    pub status: TableStatus,
    pub error: Option<String>,
    /// Row count of the written table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

impl TableResult {
    pub fn success(rows: usize) -> Self {
        Self {
            status: TableStatus::Success,
            error: None,
            rows: Some(rows),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Error,
            error: Some(message.into()),
            rows: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Skipped,
            error: Some(reason.into()),
            rows: None,
        }
    }
}

/// Result of a whole run, serialized as the status artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    /// Tables in the order they were scheduled.
    pub execution_order: Vec<String>,
    pub results: BTreeMap<String, TableResult>,
}

impl RunResult {
    pub fn new(execution_order: Vec<String>) -> Self {
        Self {
            success: true,
            execution_order,
            results: BTreeMap::new(),
        }
    }

    /// Record the outcome of a table; any non-success clears `success`.
    pub fn record(&mut self, table: impl Into<String>, result: TableResult) {
        if result.status != TableStatus::Success {
            self.success = false;
        }
        self.results.insert(table.into(), result);
    }

    pub fn status_of(&self, table: &str) -> Option<TableStatus> {
        self.results.get(table).map(|result| result.status)
    }

    /// Tables that did not succeed, in execution order.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.execution_order
            .iter()
            .filter(|table| {
                self.status_of(table)
                    .is_some_and(|status| status != TableStatus::Success)
            })
            .map(String::as_str)
            .collect()
    }
}
