mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{at, item, world, world_with, RecordingHook, USER};
use worldstate::adapters::InMemorySchedulePersistence;
use worldstate::domain::models::{
    CapacityPolicy, LearningEvent, SchedulingConfig, UpdateAction, UpdateFailure,
};
use worldstate::services::{SchedulingEngine, WorldUpdater};

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
}

fn setup(state: worldstate::WorldState) -> (WorldUpdater, Arc<InMemorySchedulePersistence>) {
    common::setup_test_logging();
    let store = Arc::new(InMemorySchedulePersistence::new());
    let updater = WorldUpdater::new(state, store.clone());
    (updater, store)
}

#[tokio::test]
async fn scenario_a_add_to_empty_world() {
    let (mut updater, store) = setup(world());

    let result = updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert_eq!(result.action, UpdateAction::Add);
    assert_eq!(result.affected_item_ids, vec!["a".to_string()]);
    assert!((updater.state().capacity().daily_hours(monday()) - 1.0).abs() < f64::EPSILON);
    assert!(store.get("a").await.is_some());
    // One daily and one weekly snapshot.
    assert_eq!(store.snapshots().await.len(), 2);
}

#[tokio::test]
async fn scenario_b_overlap_is_rejected_with_alternatives() {
    let (mut updater, store) = setup(world());
    updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;

    let result = updater.add(item("b", at(4, 9, 30), at(4, 10, 30))).await;

    let Some(UpdateFailure::Validation { result: validation, suggested_slots }) = &result.failure else {
        panic!("expected validation failure, got {:?}", result.failure);
    };
    assert_eq!(validation.conflicts.len(), 1);
    assert!(validation.conflicts[0].contains("'Task a' (a)"));
    assert_eq!(validation.conflicting_item_ids, vec!["a".to_string()]);
    assert!(!suggested_slots.is_empty());
    assert!(suggested_slots.len() <= 5);
    assert!(suggested_slots[0].start >= at(4, 10, 0));
    assert!(suggested_slots.iter().all(|s| s.duration_minutes == 60));

    assert!(!result.rollback_performed);
    assert_eq!(updater.state().items().len(), 1);
    assert!(store.get("b").await.is_none());
}

#[tokio::test]
async fn scenario_c_internally_overlapping_plan() {
    let (mut updater, store) = setup(world());
    let before = updater.state().clone();

    let result = updater
        .apply_plan(vec![
            item("p1", at(4, 9, 0), at(4, 10, 0)),
            item("p2", at(4, 9, 30), at(4, 10, 30)),
        ])
        .await;

    match &result.failure {
        Some(UpdateFailure::InternalBatchConflict { item_ids, .. }) => {
            assert!(item_ids.contains(&"p1".to_string()));
            assert!(item_ids.contains(&"p2".to_string()));
        }
        other => panic!("expected internal batch conflict, got {other:?}"),
    }
    assert_eq!(updater.state(), &before);
    assert!(store.items().await.is_empty());
    assert!(!updater.can_undo());
}

fn loaded_world() -> worldstate::WorldState {
    // 5.5h already scheduled on Monday.
    world_with(vec![
        item("x", at(4, 9, 0), at(4, 11, 30)),
        item("y", at(4, 12, 0), at(4, 15, 0)),
    ])
}

#[tokio::test]
async fn scenario_d_soft_capacity_warns() {
    let (mut updater, _) = setup(loaded_world());

    let result = updater.add(item("z", at(4, 16, 0), at(4, 17, 0))).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert!(result.warnings.iter().any(|w| w.contains("exceed daily limit")));
    assert!((updater.state().capacity().daily_hours(monday()) - 6.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn scenario_d_hard_capacity_rejects() {
    common::setup_test_logging();
    let config = SchedulingConfig {
        capacity_policy: CapacityPolicy::Hard,
        ..SchedulingConfig::default()
    };
    let store = Arc::new(InMemorySchedulePersistence::new());
    let mut updater = common::updater_with(loaded_world(), store, &config);

    let result = updater.add(item("z", at(4, 16, 0), at(4, 17, 0))).await;

    match &result.failure {
        Some(UpdateFailure::Validation { result, suggested_slots }) => {
            assert!(result.conflicts.iter().any(|c| c.contains("exceed daily limit")));
            // Not a time conflict, so no alternatives are searched.
            assert!(suggested_slots.is_empty());
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(updater.state().items().len(), 2);
}

#[tokio::test]
async fn scenario_e_slots_around_existing_item() {
    let (updater, _) = setup(world_with(vec![item("noon", at(4, 12, 0), at(4, 13, 0))]));
    let engine = SchedulingEngine::new(updater);

    let slots = engine.find_slots_on_date(monday(), 60).await;

    assert!(!slots.is_empty());
    assert!(slots.iter().all(|s| s.end <= at(4, 12, 0) || s.start >= at(4, 13, 0)));
    assert!(slots.iter().any(|s| s.start == at(4, 9, 0)));
    assert!(slots.iter().any(|s| s.end == at(4, 12, 0)));
    assert!(slots.iter().any(|s| s.start == at(4, 13, 0)));
    assert!(slots.iter().any(|s| s.end == at(4, 18, 0)));
}

#[tokio::test]
async fn add_then_remove_round_trips() {
    let (mut updater, store) = setup(world_with(vec![item("keep", at(5, 9, 0), at(5, 10, 0))]));
    let before = updater.state().clone();

    assert!(updater.add(item("a", at(4, 14, 0), at(4, 15, 30))).await.is_success());
    let removed = updater.remove("a").await;
    assert!(removed.is_success());

    assert_eq!(updater.state().items(), before.items());
    assert_eq!(updater.state().capacity(), before.capacity());
    assert!(store.get("a").await.is_none());
}

#[tokio::test]
async fn undo_restores_previous_world() {
    let (mut updater, store) = setup(world());
    let before = updater.state().clone();

    updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;
    let result = updater.undo().await;

    assert!(result.is_success());
    assert_eq!(result.message.as_deref(), Some("Undid: Add 'Task a' (a)"));
    assert_eq!(updater.state().items(), before.items());
    assert_eq!(updater.state().availability(), before.availability());
    assert_eq!(updater.state().capacity(), before.capacity());
    assert_eq!(updater.state().blackouts(), before.blackouts());
    assert!(updater.state().version() > before.version());
    assert!(store.get("a").await.is_none());

    // Undo is not itself undoable.
    assert_eq!(updater.undo().await.failure, Some(UpdateFailure::NothingToUndo));
}

#[tokio::test]
async fn undo_history_is_bounded() {
    let (mut updater, _) = setup(world());
    for i in 0..12u32 {
        let day = 4 + i / 4;
        let hour = 9 + (i % 4) * 2;
        let result = updater.add(item(&format!("i{i}"), at(day, hour, 0), at(day, hour, 30))).await;
        assert!(result.is_success(), "{:?}", result.failure);
    }

    let history = updater.undo_history();
    assert_eq!(history.len(), 10);
    assert!(history[0].description.contains("(i11)"));
    assert!(history[9].description.contains("(i2)"));
}

#[tokio::test]
async fn persistence_failure_rolls_back() {
    let (mut updater, store) = setup(world());
    updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;
    let before = updater.state().clone();
    store.fail_on_item("b").await;

    let result = updater.add(item("b", at(4, 11, 0), at(4, 12, 0))).await;

    assert!(result.rollback_performed);
    match &result.failure {
        Some(UpdateFailure::Persistence { affected_dates, .. }) => {
            assert_eq!(affected_dates, &vec![monday()]);
        }
        other => panic!("expected persistence failure, got {other:?}"),
    }
    assert_eq!(updater.state(), &before);
    assert_eq!(updater.undo_history().len(), 1);
}

#[tokio::test]
async fn failed_plan_write_leaves_storage_clean() {
    let (mut updater, store) = setup(world());
    store.fail_on_item("p3").await;

    let result = updater
        .apply_plan(vec![
            item("p1", at(4, 9, 0), at(4, 10, 0)),
            item("p2", at(4, 11, 0), at(4, 12, 0)),
            item("p3", at(5, 9, 0), at(5, 10, 0)),
        ])
        .await;

    assert!(result.rollback_performed);
    assert!(updater.state().items().is_empty());
    assert!(store.items().await.is_empty());
}

#[tokio::test]
async fn plan_with_invalid_member_is_all_or_nothing() {
    let (mut updater, _) = setup(world_with(vec![item("busy", at(4, 9, 0), at(4, 10, 0))]));

    let result = updater
        .apply_plan(vec![
            item("ok", at(4, 14, 0), at(4, 15, 0)),
            item("clash", at(4, 9, 30), at(4, 10, 0)),
        ])
        .await;

    match &result.failure {
        Some(UpdateFailure::BatchValidation { invalid_item_ids, .. }) => {
            assert_eq!(invalid_item_ids, &vec!["clash".to_string()]);
        }
        other => panic!("expected batch validation failure, got {other:?}"),
    }
    assert_eq!(updater.state().items().len(), 1);
}

#[tokio::test]
async fn learning_hook_sees_adds_and_plans_only() {
    common::setup_test_logging();
    let hook = Arc::new(RecordingHook::default());
    let store = Arc::new(InMemorySchedulePersistence::new());
    let mut updater = WorldUpdater::new(world(), store).with_learning_hook(hook.clone());

    updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;
    updater
        .apply_plan(vec![
            item("p1", at(5, 9, 0), at(5, 10, 0)),
            item("p2", at(5, 14, 0), at(5, 16, 0)),
        ])
        .await;
    updater.remove("a").await;

    let events = hook.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        LearningEvent::Item { action, item_id, duration_minutes, user_id, .. } => {
            assert_eq!(*action, UpdateAction::Add);
            assert_eq!(item_id, "a");
            assert_eq!(*duration_minutes, 60);
            assert_eq!(user_id, USER);
        }
        other => panic!("expected item event, got {other:?}"),
    }
    assert_eq!(events[1].plan_size(), 2);
}

#[tokio::test]
async fn failing_learning_hook_does_not_fail_mutation() {
    let hook = Arc::new(RecordingHook::failing());
    let store = Arc::new(InMemorySchedulePersistence::new());
    let mut updater = WorldUpdater::new(world(), store).with_learning_hook(hook.clone());

    let result = updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;

    assert!(result.is_success());
    assert_eq!(hook.events().len(), 1);
    assert!(updater.can_undo());
}

#[tokio::test]
async fn update_can_move_item_into_its_own_old_slot_range() {
    let (mut updater, _) = setup(world());
    updater.add(item("a", at(4, 9, 0), at(4, 10, 0))).await;

    // Overlaps only its own previous placement.
    let result = updater.update(item("a", at(4, 9, 30), at(4, 10, 30))).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert_eq!(updater.state().items()[0].start, at(4, 9, 30));
}

#[tokio::test]
async fn concurrent_engine_writes_are_serialized() {
    common::setup_test_logging();
    let store = Arc::new(InMemorySchedulePersistence::new());
    let engine = SchedulingEngine::shared(WorldUpdater::new(world(), store));

    let mut handles = Vec::new();
    for i in 0..6u32 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            // Every task targets the same hour; exactly one can win.
            engine.add_item(item(&format!("c{i}"), at(6, 10, 0), at(6, 11, 0))).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_success() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(engine.snapshot().await.items().len(), 1);
}

fn full_day_plan() -> Vec<worldstate::ScheduledItem> {
    // 7.5h on Monday, every gap exactly the 15 minute minimum break.
    vec![
        item("m1", at(4, 9, 0), at(4, 11, 30)),
        item("m2", at(4, 11, 45), at(4, 14, 15)),
        item("m3", at(4, 14, 30), at(4, 17, 0)),
    ]
}

#[tokio::test]
async fn soft_plan_over_daily_limit_warns() {
    let (mut updater, _) = setup(world());

    let result = updater.apply_plan(full_day_plan()).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.starts_with("m3: ") && w.contains("exceed daily limit")));
    assert!((updater.state().capacity().daily_hours(monday()) - 7.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn hard_plan_over_daily_limit_is_rejected() {
    common::setup_test_logging();
    let config = SchedulingConfig {
        capacity_policy: CapacityPolicy::Hard,
        ..SchedulingConfig::default()
    };
    let store = Arc::new(InMemorySchedulePersistence::new());
    let mut updater = common::updater_with(world(), store.clone(), &config);

    let result = updater.apply_plan(full_day_plan()).await;

    match &result.failure {
        Some(UpdateFailure::BatchValidation { invalid_item_ids, .. }) => {
            assert_eq!(invalid_item_ids, &vec!["m3".to_string()]);
        }
        other => panic!("expected batch validation failure, got {other:?}"),
    }
    assert!(updater.state().items().is_empty());
    assert!((updater.state().capacity().daily_hours(monday())).abs() < f64::EPSILON);
    assert!(store.items().await.is_empty());
}
