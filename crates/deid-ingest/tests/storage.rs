//! Round trips through the filesystem storage.

use std::fs;

use deid_ingest::{IngestError, load_mappings, read_csv, save_mappings, table_path, write_csv};
use deid_model::{KeyValue, MappingKind, MappingStore};
use polars::prelude::*;
use tempfile::TempDir;

fn sample_store() -> MappingStore {
    let mut store = MappingStore::new();
    store
        .append(
            "patient_uid",
            "patient_uid",
            "patient_uid__deid",
            &[KeyValue::Str("p-9".into()), KeyValue::Str("p-4".into())],
            &[1, 2],
        )
        .expect("identifier entry");
    store
        .append(
            "patient_uid_shift",
            "patient_uid",
            "patient_uid_shift",
            &[KeyValue::Str("p-9".into()), KeyValue::Str("p-4".into())],
            &[-12, 40],
        )
        .expect("shift entry");
    store
}

// ============================================================================
// Mapping files
// ============================================================================

#[test]
fn saved_mappings_load_back() {
    let dir = TempDir::new().expect("tempdir");
    let written = save_mappings(dir.path(), &sample_store()).expect("save");
    assert_eq!(written.len(), 2);
    assert!(dir.path().join("patient_uid.csv").is_file());
    assert!(dir.path().join("patient_uid_shift.csv").is_file());

    let store = load_mappings(dir.path()).expect("load");
    assert_eq!(store.len(), 2);

    let ids = store.get("patient_uid").expect("ids");
    assert_eq!(ids.kind(), MappingKind::Identifier);
    assert_eq!(ids.surrogate_column(), "patient_uid__deid");
    assert_eq!(ids.surrogates().expect("surrogates"), vec![Some(1), Some(2)]);

    let shifts = store.get("patient_uid_shift").expect("shifts");
    assert_eq!(shifts.kind(), MappingKind::TimeShift);
    assert_eq!(shifts.value_column(), "patient_uid");
    assert_eq!(shifts.surrogates().expect("offsets"), vec![Some(-12), Some(40)]);
}

#[test]
fn unrecognised_files_are_skipped() {
    let dir = TempDir::new().expect("tempdir");
    save_mappings(dir.path(), &sample_store()).expect("save");
    fs::write(dir.path().join("notes.csv"), "a,b\n1,2\n").expect("write");
    fs::write(dir.path().join("site.csv"), "site,site__deid\nx,not-a-number\n").expect("write");

    let store = load_mappings(dir.path()).expect("load");
    let keys: Vec<_> = store.keys().collect();
    assert_eq!(keys, vec!["patient_uid", "patient_uid_shift"]);
}

#[test]
fn missing_mapping_directory_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let result = load_mappings(&dir.path().join("absent"));
    assert!(matches!(result, Err(IngestError::DirectoryNotFound { .. })));
}

#[test]
fn empty_store_writes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("maps");
    let written = save_mappings(&out, &MappingStore::new()).expect("save");
    assert!(written.is_empty());
    assert!(out.is_dir());
}

// ============================================================================
// Tables
// ============================================================================

#[test]
fn timestamps_survive_a_write_and_read() {
    let dir = TempDir::new().expect("tempdir");
    let admitted = Series::new("admitted".into(), &[1_600_000_000_000_000i64, 1_700_000_000_000_000])
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .expect("datetime");
    let mut table = DataFrame::new(vec![
        Series::new("patient_id".into(), &[1i64, 2]).into_column(),
        admitted.into_column(),
    ])
    .expect("table");

    let path = table_path(dir.path(), "visits");
    write_csv(&path, &mut table).expect("write");
    let read = read_csv(&path, None).expect("read");

    assert!(matches!(
        read.column("admitted").expect("admitted").dtype(),
        DataType::Datetime(_, _)
    ));
    let micros: Vec<_> = read
        .column("admitted")
        .expect("admitted")
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .expect("us")
        .cast(&DataType::Int64)
        .expect("physical")
        .i64()
        .expect("i64")
        .into_iter()
        .collect();
    assert_eq!(micros, vec![Some(1_600_000_000_000_000), Some(1_700_000_000_000_000)]);
}
