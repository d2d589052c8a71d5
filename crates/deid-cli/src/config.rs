//! Loading and validating run configurations.
//!
//! Everything that can be checked without data is checked here, before any
//! table is read: transformer kinds and parameters, filter syntax, shift
//! ranges, table names and the table dependency graph.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use deid_model::RunConfig;
use deid_transform::{TablePipeline, default_registry, topological_order};

use crate::engine::EngineError;

/// A configuration whose tables all built into pipelines.
#[derive(Debug)]
pub struct ValidatedConfig {
    config: RunConfig,
    pipelines: Vec<TablePipeline>,
    table_order: Vec<usize>,
}

impl ValidatedConfig {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Pipelines aligned with `config().tables`.
    pub fn pipelines(&self) -> &[TablePipeline] {
        &self.pipelines
    }

    /// Indices into `config().tables` in processing order.
    pub fn table_order(&self) -> &[usize] {
        &self.table_order
    }

    /// Table names in processing order.
    pub fn table_names(&self) -> Vec<String> {
        self.table_order
            .iter()
            .map(|&index| self.config.tables[index].name.clone())
            .collect()
    }
}

/// Read, rebase and validate the configuration at `path`.
///
/// Relative paths in `io` are resolved against the directory holding the
/// configuration file.
pub fn load_config(path: &Path) -> Result<ValidatedConfig, EngineError> {
    let text = fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = RunConfig::from_json(&text).map_err(|source| EngineError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(base) = path.parent() {
        config.io.rebase(base);
    }
    validate_config(config)
}

/// Build every table pipeline and the table order.
pub fn validate_config(config: RunConfig) -> Result<ValidatedConfig, EngineError> {
    let mut seen = HashSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.as_str()) {
            return Err(EngineError::DuplicateTable {
                table: table.name.clone(),
            });
        }
    }

    let registry = default_registry();
    let mut pipelines = Vec::with_capacity(config.tables.len());
    for table in &config.tables {
        let pipeline = registry
            .build_pipeline(table, &config.deid)
            .map_err(|source| EngineError::InvalidTable {
                table: table.name.clone(),
                source,
            })?;
        pipelines.push(pipeline);
    }

    let graph: Vec<(&str, Vec<&str>)> = config
        .tables
        .iter()
        .map(|table| {
            let deps = table.depends_on.iter().map(String::as_str).collect();
            (table.name.as_str(), deps)
        })
        .collect();
    let table_order = topological_order(&graph).map_err(EngineError::TableOrder)?;

    Ok(ValidatedConfig {
        config,
        pipelines,
        table_order,
    })
}

#[cfg(test)]
mod tests {
    use deid_transform::{ConfigError, PipelineError, TransformError};

    use super::*;

    fn config(tables: &str) -> RunConfig {
        RunConfig::from_json(&format!(
            r#"{{
                "name": "study",
                "io": {{ "data": {{ "input": "raw", "output": "deid" }} }},
                "tables": {tables}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn tables_follow_their_dependencies() {
        let validated = validate_config(config(
            r#"[
                { "name": "visits", "depends_on": ["patients"] },
                { "name": "patients" }
            ]"#,
        ))
        .unwrap();
        assert_eq!(validated.table_names(), vec!["patients", "visits"]);
        assert_eq!(validated.pipelines().len(), 2);
    }

    #[test]
    fn duplicate_table_names_are_rejected() {
        let err = validate_config(config(r#"[{ "name": "a" }, { "name": "a" }]"#)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTable { .. }));
    }

    #[test]
    fn unknown_table_dependency_is_rejected() {
        let err =
            validate_config(config(r#"[{ "name": "a", "depends_on": ["b"] }]"#)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TableOrder(PipelineError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn unknown_kind_names_the_table() {
        let err = validate_config(config(
            r#"[{ "name": "a", "transformers": [{ "kind": "hash" }] }]"#,
        ))
        .unwrap_err();
        match err {
            EngineError::InvalidTable { table, source } => {
                assert_eq!(table, "a");
                assert!(matches!(
                    source,
                    TransformError::Config(ConfigError::UnknownKind { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
