//! Persistence port for scheduled items and capacity snapshots.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CapacitySnapshot, ScheduledItem};

/// Everything one mutation needs written, applied as a single unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistenceChange {
    pub user_id: String,
    pub added: Vec<ScheduledItem>,
    /// `(previous, replacement)` pairs; the previous value is kept for
    /// compensation.
    pub updated: Vec<(ScheduledItem, ScheduledItem)>,
    /// Full removed items, so a failed unit can restore them.
    pub removed: Vec<ScheduledItem>,
    pub snapshots: Vec<CapacitySnapshot>,
}

impl PersistenceChange {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// The writes that turn the item set `from` into `to`.
    pub fn diff(user_id: impl Into<String>, from: &[ScheduledItem], to: &[ScheduledItem]) -> Self {
        let current: HashMap<&str, &ScheduledItem> = from.iter().map(|i| (i.id.as_str(), i)).collect();
        let target: HashMap<&str, &ScheduledItem> = to.iter().map(|i| (i.id.as_str(), i)).collect();

        let mut change = Self::new(user_id);
        for item in to {
            match current.get(item.id.as_str()) {
                None => change.added.push(item.clone()),
                Some(&old) if old != item => change.updated.push((old.clone(), item.clone())),
                Some(_) => {}
            }
        }
        change.removed = from
            .iter()
            .filter(|i| !target.contains_key(i.id.as_str()))
            .cloned()
            .collect();
        change
    }

    /// Whether any item is written (snapshots alone do not count).
    pub fn touches_items(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.added
            .iter()
            .map(|i| i.id.clone())
            .chain(self.updated.iter().map(|(_, new)| new.id.clone()))
            .chain(self.removed.iter().map(|i| i.id.clone()))
            .collect()
    }
}

/// A write already applied by the default `persist_change`.
enum Applied<'a> {
    Added(&'a ScheduledItem),
    Updated(&'a ScheduledItem),
    Removed(&'a ScheduledItem),
}

/// Durable storage for one or more users' schedules.
///
/// Implementations must be safe to share between engines.
#[async_trait]
pub trait SchedulePersistence: Send + Sync {
    /// Insert a new item.
    async fn add_item(&self, item: &ScheduledItem) -> DomainResult<()>;

    /// Delete an item by id.
    async fn remove_item(&self, item_id: &str) -> DomainResult<()>;

    /// Replace a stored item.
    async fn update_item(&self, item: &ScheduledItem) -> DomainResult<()>;

    /// Record a period's load against its limit.
    async fn write_capacity_snapshot(&self, snapshot: &CapacitySnapshot) -> DomainResult<()>;

    /// Every stored item for `user_id`.
    async fn load_all_items(&self, user_id: &str) -> DomainResult<Vec<ScheduledItem>>;

    /// Apply a whole change or nothing.
    ///
    /// The default applies the item writes one by one, then the snapshots.
    /// If any call fails, the item writes already applied are reverted in
    /// reverse order before the original error is returned. Adapters with
    /// transactions should override this.
    async fn persist_change(&self, change: &PersistenceChange) -> DomainResult<()> {
        let mut applied: Vec<Applied<'_>> = Vec::new();

        let outcome = async {
            for item in &change.added {
                self.add_item(item).await?;
                applied.push(Applied::Added(item));
            }
            for (old, new) in &change.updated {
                self.update_item(new).await?;
                applied.push(Applied::Updated(old));
            }
            for item in &change.removed {
                self.remove_item(&item.id).await?;
                applied.push(Applied::Removed(item));
            }
            for snapshot in &change.snapshots {
                self.write_capacity_snapshot(snapshot).await?;
            }
            Ok::<(), DomainError>(())
        }
        .await;

        if let Err(err) = outcome {
            for write in applied.iter().rev() {
                let undo = match write {
                    Applied::Added(item) => self.remove_item(&item.id).await,
                    Applied::Updated(old) => self.update_item(old).await,
                    Applied::Removed(item) => self.add_item(item).await,
                };
                if let Err(undo_err) = undo {
                    tracing::error!(
                        user_id = %change.user_id,
                        error = %undo_err,
                        "failed to compensate partially applied change"
                    );
                }
            }
            return Err(err);
        }

        Ok(())
    }
}
