//! Integration tests for multi-table runs against a temporary directory.

use std::fs;
use std::path::Path;

use deid_cli::{EngineError, RunOptions, load_config, run};
use deid_model::TableStatus;
use deid_transform::Direction;
use polars::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

fn write_inputs(root: &Path) {
    let raw = root.join("raw");
    fs::create_dir_all(&raw).expect("raw dir");
    fs::write(
        raw.join("patients.csv"),
        "patient_id,age,name\np-9,54,Ann\np-4,29,Bob\np-7,41,Cid\n",
    )
    .expect("patients");
    fs::write(
        raw.join("visits.csv"),
        "visit_id,patient_id,visit_date\n1,p-4,2024-01-05\n2,p-9,2024-02-11\n3,p-4,2024-03-20\n",
    )
    .expect("visits");
}

fn base_config(tables: Value) -> Value {
    json!({
        "name": "study",
        "deid": { "time_shift": { "unit": "days", "min": -30, "max": 30, "seed": 5 } },
        "io": {
            "data": { "input": "raw", "output": "deid" },
            "mappings": { "output": "maps" },
            "runtime": "runtime"
        },
        "tables": tables
    })
}

fn study_tables() -> Value {
    json!([
        {
            "name": "visits",
            "depends_on": ["patients"],
            "transformers": [
                {
                    "id": "shift",
                    "kind": "datetime_shift",
                    "params": {
                        "reference_column": "patient_id",
                        "reference": "patient_uid",
                        "datetime_column": "visit_date"
                    }
                },
                {
                    "id": "patient",
                    "kind": "identifier",
                    "depends_on": ["shift"],
                    "params": { "column": "patient_id", "reference": "patient_uid" }
                }
            ]
        },
        {
            "name": "patients",
            "transformers": [
                {
                    "kind": "identifier",
                    "params": { "column": "patient_id", "reference": "patient_uid" }
                },
                { "kind": "column_drop", "params": { "column": "name" } }
            ]
        }
    ])
}

fn write_config(root: &Path, config: &Value) -> std::path::PathBuf {
    let path = root.join("deid.json");
    fs::write(&path, serde_json::to_string_pretty(config).expect("json")).expect("config");
    path
}

fn read(path: &Path) -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .expect("reader")
        .finish()
        .expect("csv")
}

fn ints(table: &DataFrame, column: &str) -> Vec<Option<i64>> {
    table
        .column(column)
        .expect("column")
        .i64()
        .expect("i64")
        .into_iter()
        .collect()
}

// ============================================================================
// Forward runs
// ============================================================================

#[test]
fn run_writes_tables_mappings_and_status() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let path = write_config(dir.path(), &base_config(study_tables()));

    let validated = load_config(&path).expect("config");
    let outcome = run(&validated, &RunOptions::default()).expect("run");

    assert!(outcome.result.success);
    assert_eq!(outcome.result.execution_order, vec!["patients", "visits"]);
    assert_eq!(outcome.result.results["patients"].rows, Some(3));

    let patients = read(&dir.path().join("deid/patients.csv"));
    assert_eq!(ints(&patients, "patient_id"), vec![Some(1), Some(2), Some(3)]);
    assert!(patients.column("name").is_err());

    // Visits share the identifier space created by the patients table.
    let visits = read(&dir.path().join("deid/visits.csv"));
    assert_eq!(ints(&visits, "patient_id"), vec![Some(2), Some(1), Some(2)]);

    assert!(dir.path().join("maps/patient_uid.csv").is_file());
    assert!(dir.path().join("maps/patient_uid_shift.csv").is_file());
    assert_eq!(outcome.mapping_files.len(), 2);

    let status_path = outcome.status_file.expect("status file");
    let status: Value =
        serde_json::from_str(&fs::read_to_string(status_path).expect("status")).expect("json");
    assert_eq!(status["success"], json!(true));
    assert_eq!(status["results"]["visits"]["status"], json!("success"));
}

#[test]
fn rerun_with_saved_mappings_is_stable() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let path = write_config(dir.path(), &base_config(study_tables()));
    run(&load_config(&path).expect("config"), &RunOptions::default()).expect("first run");
    let first = fs::read_to_string(dir.path().join("deid/visits.csv")).expect("first");

    let mut config = base_config(study_tables());
    config["io"]["mappings"] = json!({ "input": "maps", "output": "maps2" });
    let path = write_config(dir.path(), &config);
    run(&load_config(&path).expect("config"), &RunOptions::default()).expect("second run");

    let second = fs::read_to_string(dir.path().join("deid/visits.csv")).expect("second");
    assert_eq!(first, second);
    let ids = read(&dir.path().join("maps2/patient_uid.csv"));
    assert_eq!(ids.height(), 3);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let path = write_config(dir.path(), &base_config(study_tables()));

    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let outcome = run(&load_config(&path).expect("config"), &options).expect("run");

    assert!(outcome.result.success);
    assert!(outcome.status_file.is_none());
    assert!(!dir.path().join("deid").exists());
    assert!(!dir.path().join("maps").exists());
    assert!(!dir.path().join("runtime").exists());
}

#[test]
fn rows_limit_truncates_tables() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let path = write_config(dir.path(), &base_config(study_tables()));

    let options = RunOptions {
        rows_limit: Some(2),
        ..RunOptions::default()
    };
    let outcome = run(&load_config(&path).expect("config"), &options).expect("run");
    assert_eq!(outcome.result.results["patients"].rows, Some(2));
    assert_eq!(outcome.result.results["visits"].rows, Some(2));
}

// ============================================================================
// Failures
// ============================================================================

fn failing_tables() -> Value {
    json!([
        {
            "name": "patients",
            "transformers": [
                { "kind": "identifier", "params": { "column": "missing" } }
            ]
        },
        {
            "name": "visits",
            "depends_on": ["patients"],
            "transformers": [
                { "kind": "identifier", "params": { "column": "patient_id" } }
            ]
        },
        {
            "name": "sites",
            "transformers": []
        }
    ])
}

#[test]
fn failure_aborts_without_continue() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    fs::write(dir.path().join("raw/sites.csv"), "site\nA\n").expect("sites");
    let path = write_config(dir.path(), &base_config(failing_tables()));

    let err = run(&load_config(&path).expect("config"), &RunOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::TableFailed { ref table, .. } if table == "patients"));
    insta::assert_snapshot!(err, @"table 'patients' failed: column 'missing' not found in table");
    assert!(!dir.path().join("maps").exists());
    assert!(!dir.path().join("deid/sites.csv").exists());
}

#[test]
fn continue_on_error_skips_dependents() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    fs::write(dir.path().join("raw/sites.csv"), "site\nA\n").expect("sites");
    let path = write_config(dir.path(), &base_config(failing_tables()));

    let options = RunOptions {
        continue_on_error: true,
        ..RunOptions::default()
    };
    let outcome = run(&load_config(&path).expect("config"), &options).expect("run");

    let result = &outcome.result;
    assert!(!result.success);
    assert_eq!(result.status_of("patients"), Some(TableStatus::Error));
    assert_eq!(result.status_of("visits"), Some(TableStatus::Skipped));
    assert_eq!(result.status_of("sites"), Some(TableStatus::Success));
    assert!(
        result.results["patients"]
            .error
            .as_deref()
            .is_some_and(|message| message.contains("'missing'"))
    );
    assert!(dir.path().join("deid/sites.csv").is_file());
}

#[test]
fn cyclic_pipeline_fails_the_table_only() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let tables = json!([
        {
            "name": "patients",
            "transformers": [
                {
                    "id": "a",
                    "kind": "identifier",
                    "depends_on": ["b"],
                    "params": { "column": "patient_id" }
                },
                {
                    "id": "b",
                    "kind": "column_drop",
                    "depends_on": ["a"],
                    "params": { "column": "name" }
                }
            ]
        }
    ]);
    let path = write_config(dir.path(), &base_config(tables));

    let options = RunOptions {
        continue_on_error: true,
        ..RunOptions::default()
    };
    let outcome = run(&load_config(&path).expect("config"), &options).expect("run");
    assert_eq!(outcome.result.status_of("patients"), Some(TableStatus::Error));
    assert!(outcome.mapping_files.is_empty());
}

#[test]
fn invalid_config_fails_before_reading_tables() {
    let dir = TempDir::new().expect("tempdir");
    let tables = json!([
        {
            "name": "patients",
            "transformers": [
                {
                    "kind": "identifier",
                    "params": { "column": "patient_id" },
                    "filter": { "condition": "age >" }
                }
            ]
        }
    ]);
    let path = write_config(dir.path(), &base_config(tables));
    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, EngineError::InvalidTable { .. }));
}

// ============================================================================
// Reverse
// ============================================================================

#[test]
fn reverse_restores_the_raw_tables() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let path = write_config(dir.path(), &base_config(study_tables()));
    let validated = load_config(&path).expect("config");
    run(&validated, &RunOptions::default()).expect("forward");

    let restored_dir = dir.path().join("restored");
    let options = RunOptions {
        direction: Direction::Reverse,
        restore_dir: Some(restored_dir.clone()),
        ..RunOptions::default()
    };
    let outcome = run(&validated, &options).expect("reverse");
    assert!(outcome.result.success);

    assert_eq!(
        fs::read_to_string(restored_dir.join("visits.csv")).expect("visits"),
        fs::read_to_string(dir.path().join("raw/visits.csv")).expect("raw visits")
    );
    let patients = read(&restored_dir.join("patients.csv"));
    let ids: Vec<_> = patients
        .column("patient_id")
        .expect("patient_id")
        .str()
        .expect("str")
        .into_iter()
        .collect();
    assert_eq!(ids, vec![Some("p-9"), Some("p-4"), Some("p-7")]);
}

#[test]
fn reverse_requires_a_restore_directory() {
    let dir = TempDir::new().expect("tempdir");
    write_inputs(dir.path());
    let path = write_config(dir.path(), &base_config(study_tables()));
    let validated = load_config(&path).expect("config");
    run(&validated, &RunOptions::default()).expect("forward");

    let options = RunOptions {
        direction: Direction::Reverse,
        ..RunOptions::default()
    };
    assert!(matches!(
        run(&validated, &options),
        Err(EngineError::NoRestoreDir)
    ));
}
