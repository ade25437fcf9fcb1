mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{at, item, world};
use proptest::prelude::*;
use worldstate::adapters::InMemorySchedulePersistence;
use worldstate::domain::models::{date_key, ScheduledItem, WorldState};
use worldstate::services::{WorldUpdater, WorldValidator};
use worldstate::SchedulingConfig;

/// (weekday offset, quarter hour after 09:00, length in quarter hours)
fn placement() -> impl Strategy<Value = (u32, i64, i64)> {
    (0u32..5, 0i64..32, 1i64..=8)
}

fn placed(id: usize, (day, quarter, len): (u32, i64, i64)) -> ScheduledItem {
    let start: DateTime<Utc> = at(4 + day, 9, 0) + Duration::minutes(quarter * 15);
    item(&format!("item-{id}"), start, start + Duration::minutes(len * 15))
}

/// Add every placement, keeping whichever the updater accepts.
fn populate(placements: &[(u32, i64, i64)]) -> WorldUpdater {
    let store = Arc::new(InMemorySchedulePersistence::new());
    let mut updater = WorldUpdater::new(world(), store);
    tokio_test::block_on(async {
        for (id, &p) in placements.iter().enumerate() {
            updater.add(placed(id, p)).await;
        }
    });
    updater
}

fn derived_daily(state: &WorldState) -> BTreeMap<String, f64> {
    let mut tally = BTreeMap::new();
    for item in state.items() {
        *tally.entry(date_key(state.local_date(item.start))).or_insert(0.0) += item.estimated_hours();
    }
    tally
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: accepted items never overlap
    #[test]
    fn prop_accepted_items_never_overlap(placements in prop::collection::vec(placement(), 1..20)) {
        let updater = populate(&placements);
        let items = updater.state().items();
        for (i, a) in items.iter().enumerate() {
            for b in &items[i + 1..] {
                prop_assert!(!a.overlaps(b), "{} overlaps {}", a.id, b.id);
            }
        }
    }

    /// Property: tallies always match the item set
    #[test]
    fn prop_capacity_matches_items(placements in prop::collection::vec(placement(), 1..20)) {
        let updater = populate(&placements);
        let state = updater.state();
        let expected = derived_daily(state);

        prop_assert_eq!(state.capacity().daily_load.len(), expected.len());
        for (key, hours) in &expected {
            let tallied = state.capacity().daily_load.get(key).copied().unwrap_or(0.0);
            prop_assert!((tallied - hours).abs() < 1e-9, "{key}: {tallied} != {hours}");
        }
    }

    /// Property: validation is a pure function of item and state
    #[test]
    fn prop_validation_is_idempotent(
        placements in prop::collection::vec(placement(), 0..12),
        candidate in placement(),
    ) {
        let updater = populate(&placements);
        let validator = WorldValidator::new(&SchedulingConfig::default());
        let extra = placed(999, candidate);

        let first = validator.validate(&extra, updater.state());
        let second = validator.validate(&extra, updater.state());
        prop_assert_eq!(first, second);
    }

    /// Property: adding then removing an item restores items and tallies
    #[test]
    fn prop_add_remove_round_trip(
        placements in prop::collection::vec(placement(), 0..12),
        candidate in placement(),
    ) {
        let mut updater = populate(&placements);
        let items_before = updater.state().items().to_vec();
        let capacity_before = updater.state().capacity().clone();
        let extra = placed(999, candidate);

        let added = tokio_test::block_on(updater.add(extra));
        if added.is_success() {
            let removed = tokio_test::block_on(updater.remove("item-999"));
            prop_assert!(removed.is_success());
        }

        prop_assert_eq!(updater.state().items(), items_before.as_slice());
        prop_assert_eq!(updater.state().capacity(), &capacity_before);
    }
}
