//! In-memory schedule storage with failure injection.
//!
//! Relies on the port's default `persist_change`, so a failing write
//! exercises the compensation path.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CapacitySnapshot, ScheduledItem};
use crate::domain::ports::SchedulePersistence;

#[derive(Default)]
struct Inner {
    items: BTreeMap<String, ScheduledItem>,
    snapshots: Vec<CapacitySnapshot>,
    failing_items: HashSet<String>,
    fail_all: bool,
    fail_snapshots: bool,
    writes: usize,
}

impl Inner {
    fn check(&self, item_id: &str) -> DomainResult<()> {
        if self.fail_all || self.failing_items.contains(item_id) {
            return Err(DomainError::PersistenceFailed(format!(
                "injected failure writing {item_id}"
            )));
        }
        Ok(())
    }
}

/// Map-backed `SchedulePersistence`.
#[derive(Default)]
pub struct InMemorySchedulePersistence {
    inner: RwLock<Inner>,
}

impl InMemorySchedulePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an item directly, bypassing failure injection.
    pub async fn insert(&self, item: ScheduledItem) {
        self.inner.write().await.items.insert(item.id.clone(), item);
    }

    pub async fn get(&self, item_id: &str) -> Option<ScheduledItem> {
        self.inner.read().await.items.get(item_id).cloned()
    }

    pub async fn items(&self) -> Vec<ScheduledItem> {
        self.inner.read().await.items.values().cloned().collect()
    }

    pub async fn snapshots(&self) -> Vec<CapacitySnapshot> {
        self.inner.read().await.snapshots.clone()
    }

    /// Successful item and snapshot writes so far.
    pub async fn write_count(&self) -> usize {
        self.inner.read().await.writes
    }

    /// Make every write touching `item_id` fail.
    pub async fn fail_on_item(&self, item_id: impl Into<String>) {
        self.inner.write().await.failing_items.insert(item_id.into());
    }

    pub async fn fail_all(&self, fail: bool) {
        self.inner.write().await.fail_all = fail;
    }

    pub async fn fail_snapshots(&self, fail: bool) {
        self.inner.write().await.fail_snapshots = fail;
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.write().await;
        inner.failing_items.clear();
        inner.fail_all = false;
        inner.fail_snapshots = false;
    }
}

#[async_trait]
impl SchedulePersistence for InMemorySchedulePersistence {
    async fn add_item(&self, item: &ScheduledItem) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        inner.check(&item.id)?;
        if inner.items.contains_key(&item.id) {
            return Err(DomainError::PersistenceFailed(format!("item {} already stored", item.id)));
        }
        inner.items.insert(item.id.clone(), item.clone());
        inner.writes += 1;
        Ok(())
    }

    async fn remove_item(&self, item_id: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        inner.check(item_id)?;
        if inner.items.remove(item_id).is_none() {
            return Err(DomainError::ItemNotFound(item_id.to_string()));
        }
        inner.writes += 1;
        Ok(())
    }

    async fn update_item(&self, item: &ScheduledItem) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        inner.check(&item.id)?;
        match inner.items.get_mut(&item.id) {
            Some(stored) => *stored = item.clone(),
            None => return Err(DomainError::ItemNotFound(item.id.clone())),
        }
        inner.writes += 1;
        Ok(())
    }

    async fn write_capacity_snapshot(&self, snapshot: &CapacitySnapshot) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_all || inner.fail_snapshots {
            return Err(DomainError::PersistenceFailed(format!(
                "injected failure writing snapshot {}",
                snapshot.period_key
            )));
        }
        inner.snapshots.push(snapshot.clone());
        inner.writes += 1;
        Ok(())
    }

    async fn load_all_items(&self, user_id: &str) -> DomainResult<Vec<ScheduledItem>> {
        let inner = self.inner.read().await;
        if inner.fail_all {
            return Err(DomainError::PersistenceFailed("injected failure loading items".to_string()));
        }
        Ok(inner
            .items
            .values()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PeriodType;
    use crate::domain::ports::PersistenceChange;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, hour: u32) -> ScheduledItem {
        let start = Utc.with_ymd_and_hms(2030, 3, 4, hour, 0, 0).unwrap();
        ScheduledItem::new("u1", "p1", id, start, start + chrono::Duration::hours(1)).with_id(id)
    }

    #[tokio::test]
    async fn test_failed_change_is_compensated() {
        let store = InMemorySchedulePersistence::new();
        store.insert(item("old", 8)).await;
        store.fail_on_item("c").await;

        let mut change = PersistenceChange::new("u1");
        change.added.push(item("a", 9));
        change.removed.push(item("old", 8));
        change.added.push(item("c", 11));

        assert!(store.persist_change(&change).await.is_err());
        let ids: Vec<String> = store.items().await.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_failure_reverts_items() {
        let store = InMemorySchedulePersistence::new();
        store.fail_snapshots(true).await;

        let mut change = PersistenceChange::new("u1");
        change.added.push(item("a", 9));
        change
            .snapshots
            .push(CapacitySnapshot::new("u1", PeriodType::Daily, "2030-03-04", 6.0, 1.0));

        assert!(store.persist_change(&change).await.is_err());
        assert!(store.get("a").await.is_none());

        store.clear_failures().await;
        store.persist_change(&change).await.unwrap();
        assert!(store.get("a").await.is_some());
        assert_eq!(store.snapshots().await.len(), 1);
        assert_eq!(store.write_count().await, 4);
    }
}
