//! Property tests for identifier and filter invariants.

use deid_model::MappingStore;
use deid_transform::{IdentifierTransformer, RowFilter, Transformer, TransformerNode};
use polars::prelude::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn identifier_round_trips(values in prop::collection::vec(-50i64..50, 1..40)) {
        let table = df! { "id" => values.as_slice() }.expect("table");
        let mut store = MappingStore::new();
        let transformer = IdentifierTransformer::new("id", None);

        let out = transformer.transform(table.clone(), &mut store).expect("transform");
        let distinct: std::collections::HashSet<_> = values.iter().collect();
        prop_assert_eq!(store.get("id").expect("entry").len(), distinct.len());

        let surrogates: Vec<i64> = out.column("id").expect("id").i64().expect("i64")
            .into_no_null_iter().collect();
        prop_assert!(surrogates.iter().all(|&s| s >= 1 && s <= distinct.len() as i64));

        let restored = transformer.reverse(out, &store).expect("reverse");
        prop_assert!(restored.equals(&table));
    }

    #[test]
    fn filtered_identifier_keeps_height(
        rows in prop::collection::vec((0i64..100, 0i64..10), 1..40),
        threshold in 0i64..100,
    ) {
        let ages: Vec<i64> = rows.iter().map(|(age, _)| *age).collect();
        let ids: Vec<i64> = rows.iter().map(|(_, id)| *id).collect();
        let table = df! { "age" => ages.as_slice(), "id" => ids.as_slice() }.expect("table");
        let filter = RowFilter::parse(&format!("age > {threshold}"), None).expect("filter");
        let node = TransformerNode::new("id", Box::new(IdentifierTransformer::new("id", None)))
            .with_filter(filter);

        let out = node.transform(table.clone(), &mut MappingStore::new()).expect("transform");
        prop_assert_eq!(out.height(), table.height());
        prop_assert!(out.column("age").expect("age").as_materialized_series()
            .equals(table.column("age").expect("age").as_materialized_series()));
    }
}
