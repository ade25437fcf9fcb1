//! Null persistence implementation.
//!
//! Used when a schedule lives only in memory but the engine requires a
//! SchedulePersistence implementation.

use async_trait::async_trait;

use super::SchedulePersistence;
use crate::domain::errors::DomainResult;
use crate::domain::models::{CapacitySnapshot, ScheduledItem};

/// A no-op persistence adapter that stores nothing.
#[derive(Debug, Clone, Default)]
pub struct NullSchedulePersistence;

impl NullSchedulePersistence {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SchedulePersistence for NullSchedulePersistence {
    async fn add_item(&self, _item: &ScheduledItem) -> DomainResult<()> {
        Ok(())
    }

    async fn remove_item(&self, _item_id: &str) -> DomainResult<()> {
        Ok(())
    }

    async fn update_item(&self, _item: &ScheduledItem) -> DomainResult<()> {
        Ok(())
    }

    async fn write_capacity_snapshot(&self, _snapshot: &CapacitySnapshot) -> DomainResult<()> {
        Ok(())
    }

    async fn load_all_items(&self, _user_id: &str) -> DomainResult<Vec<ScheduledItem>> {
        Ok(Vec::new())
    }
}
