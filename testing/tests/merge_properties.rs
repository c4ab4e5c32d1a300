//! Merge properties over generated keyed records.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use composable_resource_core::entity::{
    add_or_update_by_id, union_by_id, union_value_by_id, EntityId, EntityTable,
};
use composable_resource_core::operation::MergeStrategy;
use composable_resource_core::resource::ResourceState;
use composable_resource_testing::properties::keyed_records;
use proptest::prelude::*;
use serde_json::Value;

proptest! {
    #[test]
    fn union_is_last_write_wins(records in keyed_records("uuid", 8, 16)) {
        let table = union_by_id(&EntityTable::new(), &records, "uuid").unwrap();
        for (id, stored) in &table {
            let last = records
                .iter()
                .rev()
                .find(|record| &EntityId::of(record, "uuid").unwrap() == id)
                .unwrap();
            prop_assert_eq!(stored, last);
        }
    }

    #[test]
    fn folding_add_or_update_equals_union(
        base in keyed_records("uuid", 8, 8),
        batch in keyed_records("uuid", 8, 8),
    ) {
        let table = union_by_id(&EntityTable::new(), &base, "uuid").unwrap();
        let folded = batch
            .iter()
            .try_fold(table.clone(), |acc, record| add_or_update_by_id(&acc, record, "uuid"))
            .unwrap();
        prop_assert_eq!(folded, union_by_id(&table, &batch, "uuid").unwrap());
    }

    #[test]
    fn union_strategy_matches_union_function(records in keyed_records("uuid", 8, 12)) {
        let payload = Value::Array(records);
        let mut state = ResourceState::default();
        MergeStrategy::Union.apply(&mut state, &payload, "uuid").unwrap();
        prop_assert_eq!(
            state.data,
            union_value_by_id(&EntityTable::new(), &payload, "uuid").unwrap()
        );
    }
}
