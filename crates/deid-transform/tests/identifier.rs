//! Tests for sequential surrogate identifiers.

use deid_model::{KeyValue, MappingStore};
use deid_transform::merge::MergeDiagnosis;
use deid_transform::{IdentifierTransformer, TransformError, Transformer};
use polars::prelude::*;

fn int_values(table: &DataFrame, column: &str) -> Vec<Option<i64>> {
    table
        .column(column)
        .expect("column")
        .i64()
        .expect("i64")
        .into_iter()
        .collect()
}

fn str_values(table: &DataFrame, column: &str) -> Vec<Option<String>> {
    table
        .column(column)
        .expect("column")
        .str()
        .expect("str")
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect()
}

// ============================================================================
// Forward
// ============================================================================

#[test]
fn assigns_surrogates_by_first_appearance() {
    let table = df! { "id" => &[1i64, 2, 1, 2, 3] }.expect("table");
    let mut store = MappingStore::new();

    let out = IdentifierTransformer::new("id", None)
        .transform(table, &mut store)
        .expect("transform");

    assert_eq!(
        int_values(&out, "id"),
        vec![Some(1), Some(2), Some(1), Some(2), Some(3)]
    );
    let entry = store.get("id").expect("entry");
    assert_eq!(entry.len(), 3);
    assert_eq!(entry.value_column(), "id");
    assert_eq!(entry.surrogate_column(), "id__deid");
    assert_eq!(
        entry.value_keys().expect("keys").distinct(),
        vec![KeyValue::Int(1), KeyValue::Int(2), KeyValue::Int(3)]
    );
    assert_eq!(
        entry.surrogates().expect("surrogates"),
        vec![Some(1), Some(2), Some(3)]
    );
}

#[test]
fn string_values_get_integer_surrogates() {
    let table = df! { "user" => &["carol", "alice", "carol", "bob"] }.expect("table");
    let mut store = MappingStore::new();

    let out = IdentifierTransformer::new("user", Some("user_uid".to_string()))
        .transform(table, &mut store)
        .expect("transform");

    assert_eq!(out.column("user").expect("user").dtype(), &DataType::Int64);
    assert_eq!(
        int_values(&out, "user"),
        vec![Some(1), Some(2), Some(1), Some(3)]
    );
    assert!(store.get("user_uid").is_some());
    assert!(store.get("user").is_none());
}

#[test]
fn replay_reuses_assignments_without_growing() {
    let table = df! { "id" => &[10i64, 20, 10] }.expect("table");
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);

    let first = transformer
        .transform(table.clone(), &mut store)
        .expect("first");
    let second = transformer.transform(table, &mut store).expect("second");

    assert!(first.equals(&second));
    assert_eq!(store.get("id").expect("entry").len(), 2);
}

#[test]
fn new_values_continue_the_sequence() {
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);
    transformer
        .transform(df! { "id" => &[5i64, 6] }.expect("table"), &mut store)
        .expect("first");

    let out = transformer
        .transform(df! { "id" => &[7i64, 5] }.expect("table"), &mut store)
        .expect("second");

    assert_eq!(int_values(&out, "id"), vec![Some(3), Some(1)]);
    assert_eq!(store.get("id").expect("entry").max_surrogate().expect("max"), Some(3));
}

#[test]
fn shared_reference_links_tables() {
    let mut store = MappingStore::new();
    let patients = df! { "patient_id" => &[100i64, 200] }.expect("patients");
    let visits = df! { "subject" => &[200i64, 200, 100, 300] }.expect("visits");

    IdentifierTransformer::new("patient_id", Some("patient_uid".to_string()))
        .transform(patients, &mut store)
        .expect("patients");
    let visits = IdentifierTransformer::new("subject", Some("patient_uid".to_string()))
        .transform(visits, &mut store)
        .expect("visits");

    assert_eq!(
        int_values(&visits, "subject"),
        vec![Some(2), Some(2), Some(1), Some(3)]
    );
    assert_eq!(store.len(), 1);
}

#[test]
fn narrow_integer_columns_match_wide_entries() {
    let mut store = MappingStore::new();
    IdentifierTransformer::new("id", None)
        .transform(df! { "id" => &[1i64, 2] }.expect("table"), &mut store)
        .expect("wide");

    let narrow = df! { "id" => &[2i32, 1] }.expect("table");
    let out = IdentifierTransformer::new("id", None)
        .transform(narrow, &mut store)
        .expect("narrow");
    assert_eq!(int_values(&out, "id"), vec![Some(2), Some(1)]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn nulls_are_fatal_and_leave_store_untouched() {
    let table = df! { "id" => &[Some(1i64), None] }.expect("table");
    let mut store = MappingStore::new();

    let err = IdentifierTransformer::new("id", None)
        .transform(table, &mut store)
        .unwrap_err();

    assert!(matches!(err, TransformError::NullValues { count: 1, .. }));
    assert!(store.is_empty());
}

#[test]
fn missing_column_is_reported() {
    let table = df! { "other" => &[1i64] }.expect("table");
    let err = IdentifierTransformer::new("id", None)
        .transform(table, &mut MappingStore::new())
        .unwrap_err();
    assert!(matches!(err, TransformError::ColumnNotFound { .. }));
}

#[test]
fn float_keys_are_rejected() {
    let table = df! { "score" => &[1.5f64] }.expect("table");
    let err = IdentifierTransformer::new("score", None)
        .transform(table, &mut MappingStore::new())
        .unwrap_err();
    assert!(matches!(err, TransformError::UnsupportedKeyType { .. }));
}

#[test]
fn string_source_against_integer_entry_is_a_type_mismatch() {
    let mut store = MappingStore::new();
    IdentifierTransformer::new("id", None)
        .transform(df! { "id" => &[1i64, 2] }.expect("table"), &mut store)
        .expect("seed entry");

    let err = IdentifierTransformer::new("id", None)
        .transform(df! { "id" => &["1", "2"] }.expect("table"), &mut store)
        .unwrap_err();

    match err {
        TransformError::Merge(MergeDiagnosis::TypeMismatch { sample, .. }) => {
            assert_eq!(sample.total(), 2);
        }
        other => panic!("expected a type mismatch, got {other}"),
    }
    assert_eq!(store.get("id").expect("entry").len(), 2);
}

// ============================================================================
// Reverse
// ============================================================================

#[test]
fn reverse_restores_original_values() {
    let table = df! { "user" => &["b", "a", "b", "c"] }.expect("table");
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("user", None);

    let out = transformer
        .transform(table.clone(), &mut store)
        .expect("transform");
    let restored = transformer.reverse(out, &store).expect("reverse");

    assert_eq!(str_values(&restored, "user"), str_values(&table, "user"));
}

#[test]
fn reverse_accepts_surrogates_read_as_text() {
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);
    transformer
        .transform(df! { "id" => &[40i64, 50] }.expect("table"), &mut store)
        .expect("transform");

    let restored = transformer
        .reverse(df! { "id" => &["2", "1"] }.expect("table"), &store)
        .expect("reverse");
    assert_eq!(int_values(&restored, "id"), vec![Some(50), Some(40)]);
}

#[test]
fn reverse_accepts_whole_float_surrogates() {
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);
    transformer
        .transform(df! { "id" => &[40i64, 50] }.expect("table"), &mut store)
        .expect("transform");

    let restored = transformer
        .reverse(df! { "id" => &[2.0f64, 1.0] }.expect("table"), &store)
        .expect("reverse");
    assert_eq!(int_values(&restored, "id"), vec![Some(50), Some(40)]);
}

#[test]
fn reverse_rejects_fractional_surrogates() {
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);
    transformer
        .transform(df! { "id" => &[40i64, 50] }.expect("table"), &mut store)
        .expect("transform");

    let err = transformer
        .reverse(df! { "id" => &[1.0f64, 1.5] }.expect("table"), &store)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::NonIntegralSurrogate { ref column, value } if column == "id" && value == 1.5
    ));
}

#[test]
fn reverse_rejects_unparseable_text_surrogates() {
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);
    transformer
        .transform(df! { "id" => &[40i64] }.expect("table"), &mut store)
        .expect("transform");

    let err = transformer
        .reverse(df! { "id" => &["1", "1.5"] }.expect("table"), &store)
        .unwrap_err();
    assert!(matches!(err, TransformError::Cast { .. }));
}

#[test]
fn reverse_without_entry_fails() {
    let err = IdentifierTransformer::new("id", None)
        .reverse(df! { "id" => &[1i64] }.expect("table"), &MappingStore::new())
        .unwrap_err();
    assert!(matches!(err, TransformError::MissingEntry { .. }));
}

#[test]
fn reverse_of_unknown_surrogate_fails() {
    let mut store = MappingStore::new();
    let transformer = IdentifierTransformer::new("id", None);
    transformer
        .transform(df! { "id" => &[7i64] }.expect("table"), &mut store)
        .expect("transform");

    let err = transformer
        .reverse(df! { "id" => &[1i64, 9] }.expect("table"), &store)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Merge(MergeDiagnosis::MissingMappings { count: 1, .. })
    ));
}
