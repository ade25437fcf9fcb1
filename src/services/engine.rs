//! Per-user scheduling facade.
//!
//! Writes are serialized through a write lock on the updater; queries take
//! the read lock and may run concurrently. Per-date slot lookups are cached
//! and evicted by the cache keys each committed mutation reports.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use super::updater::WorldUpdater;
use crate::domain::models::{
    date_key, ScheduledItem, SlotQuery, SlotQueryResult, TimeSlot, UndoSummary, UpdateResult,
    ValidationResult, WorldState,
};

/// A cached slot list and the world version it was computed against.
#[derive(Debug, Clone)]
struct CachedSlots {
    version: u64,
    slots: Vec<TimeSlot>,
}

/// Thread-safe entry point for one user's schedule.
pub struct SchedulingEngine {
    user_id: String,
    updater: RwLock<WorldUpdater>,
    slot_cache: Mutex<HashMap<String, CachedSlots>>,
}

impl SchedulingEngine {
    pub fn new(updater: WorldUpdater) -> Self {
        Self {
            user_id: updater.state().user_id().to_string(),
            updater: RwLock::new(updater),
            slot_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap in an `Arc` for sharing across tasks.
    pub fn shared(updater: WorldUpdater) -> Arc<Self> {
        Arc::new(Self::new(updater))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// A consistent copy of the current world.
    pub async fn snapshot(&self) -> WorldState {
        self.updater.read().await.state().clone()
    }

    pub async fn version(&self) -> u64 {
        self.updater.read().await.state().version()
    }

    pub async fn undo_history(&self) -> Vec<UndoSummary> {
        self.updater.read().await.undo_history()
    }

    pub async fn can_undo(&self) -> bool {
        self.updater.read().await.can_undo()
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub async fn add_item(&self, item: ScheduledItem) -> UpdateResult {
        let result = self.updater.write().await.add(item).await;
        self.after_mutation(&result).await;
        result
    }

    pub async fn update_item(&self, item: ScheduledItem) -> UpdateResult {
        let result = self.updater.write().await.update(item).await;
        self.after_mutation(&result).await;
        result
    }

    pub async fn remove_item(&self, item_id: &str) -> UpdateResult {
        let result = self.updater.write().await.remove(item_id).await;
        self.after_mutation(&result).await;
        result
    }

    pub async fn apply_plan(&self, items: Vec<ScheduledItem>) -> UpdateResult {
        let result = self.updater.write().await.apply_plan(items).await;
        self.after_mutation(&result).await;
        result
    }

    pub async fn undo(&self) -> UpdateResult {
        let result = self.updater.write().await.undo().await;
        if result.is_success() {
            self.clear_cache().await;
        }
        result
    }

    pub async fn resync_from_storage(&self) -> UpdateResult {
        let result = self.updater.write().await.resync_from_storage().await;
        if result.is_success() {
            self.clear_cache().await;
        }
        result
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Check a candidate without applying it.
    pub async fn validate_item(&self, item: &ScheduledItem) -> ValidationResult {
        let updater = self.updater.read().await;
        updater.validator().validate(item, updater.state())
    }

    pub async fn find_next_free_slot(
        &self,
        duration_minutes: u32,
        after: Option<DateTime<Utc>>,
    ) -> Option<TimeSlot> {
        let updater = self.updater.read().await;
        updater
            .slot_engine()
            .find_next_free_slot(updater.state(), duration_minutes, after)
    }

    /// Open slots on `date`, served from the cache when still current.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn find_slots_on_date(&self, date: NaiveDate, duration_minutes: u32) -> Vec<TimeSlot> {
        let updater = self.updater.read().await;
        let version = updater.state().version();
        let key = slot_cache_key(date, duration_minutes);

        if let Some(cached) = self.slot_cache.lock().await.get(&key) {
            if cached.version == version {
                debug!(%key, "slot cache hit");
                return cached.slots.clone();
            }
        }

        let slots = updater
            .slot_engine()
            .find_slots_on_date(updater.state(), date, duration_minutes);
        self.slot_cache.lock().await.insert(
            key,
            CachedSlots {
                version,
                slots: slots.clone(),
            },
        );
        slots
    }

    pub async fn find_slots_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        duration_minutes: u32,
    ) -> Vec<TimeSlot> {
        let updater = self.updater.read().await;
        updater
            .slot_engine()
            .find_slots_in_range(updater.state(), start, end, duration_minutes)
    }

    pub async fn can_fit(
        &self,
        date: NaiveDate,
        duration_minutes: u32,
        earliest: Option<NaiveTime>,
        latest: Option<NaiveTime>,
    ) -> bool {
        let updater = self.updater.read().await;
        updater
            .slot_engine()
            .can_fit(updater.state(), date, duration_minutes, earliest, latest)
    }

    pub async fn find_available_slots(&self, query: &SlotQuery) -> SlotQueryResult {
        let updater = self.updater.read().await;
        updater.slot_engine().find_available_slots(updater.state(), query)
    }

    /// Number of cached slot lists.
    pub async fn cached_entries(&self) -> usize {
        self.slot_cache.lock().await.len()
    }

    async fn after_mutation(&self, result: &UpdateResult) {
        if !result.is_success() || result.invalidated_cache_keys.is_empty() {
            return;
        }
        let mut cache = self.slot_cache.lock().await;
        for key in result.invalidated_cache_keys.iter().filter(|k| k.starts_with("slots_")) {
            let prefix = format!("{key}_");
            cache.retain(|cached, _| !cached.starts_with(&prefix));
        }
        debug!(remaining = cache.len(), "slot cache invalidated");
    }

    async fn clear_cache(&self) {
        self.slot_cache.lock().await.clear();
    }
}

fn slot_cache_key(date: NaiveDate, duration_minutes: u32) -> String {
    format!("slots_{}_{duration_minutes}", date_key(date))
}
