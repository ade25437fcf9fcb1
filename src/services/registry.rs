//! Lazily created per-user engines.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveTime;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::engine::SchedulingEngine;
use super::updater::WorldUpdater;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AvailabilityMap, SchedulingConfig, TimeRange, WorldState};
use crate::domain::ports::{LearningHook, NullLearningHook, SchedulePersistence};

/// One engine, and therefore one write lock, per user.
pub struct EngineRegistry {
    config: SchedulingConfig,
    persistence: Arc<dyn SchedulePersistence>,
    learning: Arc<dyn LearningHook>,
    engines: RwLock<HashMap<String, Arc<SchedulingEngine>>>,
}

impl EngineRegistry {
    pub fn new(config: SchedulingConfig, persistence: Arc<dyn SchedulePersistence>) -> Self {
        Self {
            config,
            persistence,
            learning: Arc::new(NullLearningHook),
            engines: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_learning_hook(mut self, hook: Arc<dyn LearningHook>) -> Self {
        self.learning = hook;
        self
    }

    /// The engine for `user_id`, seeding it from storage on first use.
    #[instrument(skip(self))]
    pub async fn engine_for(&self, user_id: &str) -> DomainResult<Arc<SchedulingEngine>> {
        if let Some(engine) = self.engines.read().await.get(user_id) {
            return Ok(Arc::clone(engine));
        }

        // Storage is read without the map lock; a concurrent first access
        // for the same user keeps whichever engine was inserted first.
        let items = self.persistence.load_all_items(user_id).await?;
        let availability = default_availability(&self.config, user_id)?;
        let state = WorldState::from_parts(
            user_id,
            items,
            availability,
            self.config.default_capacity.clone(),
            Vec::new(),
        );
        let loaded = state.items().len();

        let mut engines = self.engines.write().await;
        let engine = engines
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!(user_id, items = loaded, "world state loaded");
                self.build(state)
            });
        Ok(Arc::clone(engine))
    }

    /// Install an engine around a caller-built state, replacing any
    /// existing engine for that user.
    pub async fn register(&self, state: WorldState) -> Arc<SchedulingEngine> {
        let user_id = state.user_id().to_string();
        let engine = self.build(state);
        self.engines.write().await.insert(user_id, Arc::clone(&engine));
        engine
    }

    /// Drop a user's engine; the next access reloads from storage.
    pub async fn evict(&self, user_id: &str) -> bool {
        self.engines.write().await.remove(user_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.engines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.engines.read().await.is_empty()
    }

    fn build(&self, state: WorldState) -> Arc<SchedulingEngine> {
        let updater = WorldUpdater::with_config(state, Arc::clone(&self.persistence), &self.config)
            .with_learning_hook(Arc::clone(&self.learning));
        SchedulingEngine::shared(updater)
    }
}

/// The weekly pattern new users start with.
pub fn default_availability(config: &SchedulingConfig, user_id: &str) -> DomainResult<AvailabilityMap> {
    let start = parse_hhmm(&config.default_work_start)?;
    let end = parse_hhmm(&config.default_work_end)?;
    Ok(AvailabilityMap::working_week(
        user_id,
        config.default_timezone.clone(),
        TimeRange::new(start, end),
        config.work_on_weekends,
    ))
}

fn parse_hhmm(value: &str) -> DomainResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| DomainError::ValidationFailed(format!("invalid time of day '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySchedulePersistence;
    use crate::domain::models::ScheduledItem;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_engine_is_seeded_and_reused() {
        let store = Arc::new(InMemorySchedulePersistence::new());
        let start = Utc.with_ymd_and_hms(2030, 3, 4, 9, 0, 0).unwrap();
        store
            .insert(ScheduledItem::new("u1", "p1", "A", start, start + chrono::Duration::hours(2)))
            .await;

        let registry = EngineRegistry::new(SchedulingConfig::default(), store);
        let first = registry.engine_for("u1").await.unwrap();
        let second = registry.engine_for("u1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let state = first.snapshot().await;
        assert_eq!(state.items().len(), 1);
        assert!((state.capacity().daily_hours(start.date_naive()) - 2.0).abs() < f64::EPSILON);

        let other = registry.engine_for("u2").await.unwrap();
        assert!(other.snapshot().await.items().is_empty());
        assert_eq!(registry.len().await, 2);

        assert!(registry.evict("u1").await);
        assert_eq!(registry.len().await, 1);
    }

    /// Holds `load_all_items` for one user until released.
    struct GatedStore {
        inner: InMemorySchedulePersistence,
        gated_user: &'static str,
        gate: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl SchedulePersistence for GatedStore {
        async fn add_item(&self, item: &ScheduledItem) -> DomainResult<()> {
            self.inner.add_item(item).await
        }

        async fn remove_item(&self, item_id: &str) -> DomainResult<()> {
            self.inner.remove_item(item_id).await
        }

        async fn update_item(&self, item: &ScheduledItem) -> DomainResult<()> {
            self.inner.update_item(item).await
        }

        async fn write_capacity_snapshot(
            &self,
            snapshot: &crate::domain::models::CapacitySnapshot,
        ) -> DomainResult<()> {
            self.inner.write_capacity_snapshot(snapshot).await
        }

        async fn load_all_items(&self, user_id: &str) -> DomainResult<Vec<ScheduledItem>> {
            if user_id == self.gated_user {
                self.gate.notified().await;
            }
            self.inner.load_all_items(user_id).await
        }
    }

    #[tokio::test]
    async fn test_slow_load_does_not_block_other_users() {
        let store = Arc::new(GatedStore {
            inner: InMemorySchedulePersistence::new(),
            gated_user: "slow",
            gate: tokio::sync::Notify::new(),
        });
        let registry = Arc::new(EngineRegistry::new(SchedulingConfig::default(), store.clone()));

        let pending = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.engine_for("slow").await.map(|_| ()) }
        });
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(std::time::Duration::from_secs(2), registry.engine_for("fast"))
            .await
            .expect("lookup for another user must not wait on the slow load");
        assert!(fast.is_ok());

        store.gate.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[test]
    fn test_default_availability() {
        let config = SchedulingConfig {
            default_work_start: "08:30".to_string(),
            default_work_end: "17:00".to_string(),
            ..SchedulingConfig::default()
        };
        let map = default_availability(&config, "u1").unwrap();
        let monday = map.weekly_ranges(crate::domain::models::DayOfWeek::Monday).unwrap();
        assert_eq!(monday, &[TimeRange::hm(8, 30, 17, 0)]);

        let bad = SchedulingConfig {
            default_work_start: "9am".to_string(),
            ..SchedulingConfig::default()
        };
        assert!(default_availability(&bad, "u1").is_err());
    }
}
