//! Common test utilities for integration tests
//!
//! Shared fixtures for building worlds, items and updaters.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use worldstate::domain::errors::{DomainError, DomainResult};
use worldstate::domain::models::{
    AvailabilityMap, CapacityConstraints, LearningEvent, ScheduledItem, SchedulingConfig, TimeRange,
    WorldState,
};
use worldstate::domain::ports::{LearningHook, SchedulePersistence};
use worldstate::services::WorldUpdater;

pub const USER: &str = "user-1";

/// Create a temporary test database path
///
/// Returns the path to a SQLite database file in a temporary directory.
#[allow(dead_code)]
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.db");
    (dir, db_path)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A UTC instant in March 2030. The 4th is a Monday.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, day, hour, minute, 0)
        .single()
        .expect("valid test instant")
}

pub fn item(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ScheduledItem {
    ScheduledItem::new(USER, "plan-1", format!("Task {id}"), start, end).with_id(id)
}

/// Empty world, weekdays 09:00-18:00 UTC, conservative limits.
pub fn world() -> WorldState {
    world_with(Vec::new())
}

#[allow(dead_code)]
pub fn world_with(items: Vec<ScheduledItem>) -> WorldState {
    let availability = AvailabilityMap::working_week(USER, "UTC", TimeRange::hm(9, 0, 18, 0), false);
    WorldState::from_parts(
        USER,
        items,
        availability,
        CapacityConstraints::conservative(),
        Vec::new(),
    )
}

#[allow(dead_code)]
pub fn updater(state: WorldState, store: Arc<dyn SchedulePersistence>) -> WorldUpdater {
    WorldUpdater::new(state, store)
}

#[allow(dead_code)]
pub fn updater_with(
    state: WorldState,
    store: Arc<dyn SchedulePersistence>,
    config: &SchedulingConfig,
) -> WorldUpdater {
    WorldUpdater::with_config(state, store, config)
}

/// Learning hook that keeps every event it receives.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingHook {
    events: Mutex<Vec<LearningEvent>>,
    fail: bool,
}

#[allow(dead_code)]
impl RecordingHook {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<LearningEvent> {
        self.events.lock().expect("hook lock").clone()
    }
}

impl LearningHook for RecordingHook {
    fn record(&self, event: &LearningEvent) -> DomainResult<()> {
        self.events.lock().expect("hook lock").push(event.clone());
        if self.fail {
            return Err(DomainError::LearningHookFailed("sink unavailable".to_string()));
        }
        Ok(())
    }
}
