//! SQLite adapter for SchedulePersistence.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use crate::adapters::sqlite::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CapacitySnapshot, ItemStatus, PeriodType, ScheduledItem};
use crate::domain::ports::{PersistenceChange, SchedulePersistence};

#[derive(Clone)]
pub struct SqliteSchedulePersistence {
    pool: SqlitePool,
}

impl SqliteSchedulePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Recorded snapshots for one period, oldest first.
    pub async fn snapshots_for(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_key: &str,
    ) -> DomainResult<Vec<CapacitySnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            "SELECT user_id, period_type, period_key, limit_hours, scheduled_hours,
                    utilization_rate, recorded_at
             FROM capacity_snapshots
             WHERE user_id = ?1 AND period_type = ?2 AND period_key = ?3
             ORDER BY id ASC",
        )
        .bind(user_id)
        .bind(period_type.as_str())
        .bind(period_key)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_snapshot).collect()
    }

    pub async fn count_snapshots(&self, user_id: &str) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM capacity_snapshots WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    user_id: String,
    plan_id: String,
    title: String,
    start_time: String,
    end_time: String,
    estimated_minutes: i64,
    status: String,
    cycle_id: Option<String>,
    occurrence_id: Option<String>,
    priority: Option<i64>,
    tags: String,
    notes: Option<String>,
}

fn row_to_item(row: ItemRow) -> DomainResult<ScheduledItem> {
    let tags: Vec<String> = serde_json::from_str(&row.tags)
        .map_err(|e| DomainError::SerializationError(format!("tags: {e}")))?;
    let estimated_minutes = u32::try_from(row.estimated_minutes)
        .map_err(|e| DomainError::SerializationError(format!("estimated_minutes: {e}")))?;
    let priority = row
        .priority
        .map(u8::try_from)
        .transpose()
        .map_err(|e| DomainError::SerializationError(format!("priority: {e}")))?;

    Ok(ScheduledItem {
        id: row.id,
        user_id: row.user_id,
        plan_id: row.plan_id,
        title: row.title,
        start: parse_datetime(&row.start_time)?,
        end: parse_datetime(&row.end_time)?,
        estimated_minutes,
        status: ItemStatus::from_str(&row.status).unwrap_or_default(),
        cycle_id: row.cycle_id,
        occurrence_id: row.occurrence_id,
        priority,
        tags,
        notes: row.notes,
    })
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    user_id: String,
    period_type: String,
    period_key: String,
    limit_hours: f64,
    scheduled_hours: f64,
    utilization_rate: f64,
    recorded_at: String,
}

fn row_to_snapshot(row: SnapshotRow) -> DomainResult<CapacitySnapshot> {
    let period_type = PeriodType::from_str(&row.period_type)
        .ok_or_else(|| DomainError::SerializationError(format!("period_type: {}", row.period_type)))?;
    Ok(CapacitySnapshot {
        user_id: row.user_id,
        period_type,
        period_key: row.period_key,
        limit_hours: row.limit_hours,
        scheduled_hours: row.scheduled_hours,
        utilization_rate: row.utilization_rate,
        recorded_at: parse_datetime(&row.recorded_at)?,
    })
}

async fn insert_item(conn: &mut SqliteConnection, item: &ScheduledItem) -> DomainResult<()> {
    let tags = serde_json::to_string(&item.tags)?;

    sqlx::query(
        "INSERT INTO scheduled_items
         (id, user_id, plan_id, title, start_time, end_time, estimated_minutes,
          status, cycle_id, occurrence_id, priority, tags, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )
    .bind(&item.id)
    .bind(&item.user_id)
    .bind(&item.plan_id)
    .bind(&item.title)
    .bind(item.start.to_rfc3339())
    .bind(item.end.to_rfc3339())
    .bind(i64::from(item.estimated_minutes))
    .bind(item.status.as_str())
    .bind(&item.cycle_id)
    .bind(&item.occurrence_id)
    .bind(item.priority.map(i64::from))
    .bind(&tags)
    .bind(&item.notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn replace_item(conn: &mut SqliteConnection, item: &ScheduledItem) -> DomainResult<()> {
    let tags = serde_json::to_string(&item.tags)?;
    let updated = chrono::Utc::now().to_rfc3339();

    let result = sqlx::query(
        "UPDATE scheduled_items SET
         user_id = ?2, plan_id = ?3, title = ?4, start_time = ?5, end_time = ?6,
         estimated_minutes = ?7, status = ?8, cycle_id = ?9, occurrence_id = ?10,
         priority = ?11, tags = ?12, notes = ?13, updated_at = ?14
         WHERE id = ?1",
    )
    .bind(&item.id)
    .bind(&item.user_id)
    .bind(&item.plan_id)
    .bind(&item.title)
    .bind(item.start.to_rfc3339())
    .bind(item.end.to_rfc3339())
    .bind(i64::from(item.estimated_minutes))
    .bind(item.status.as_str())
    .bind(&item.cycle_id)
    .bind(&item.occurrence_id)
    .bind(item.priority.map(i64::from))
    .bind(&tags)
    .bind(&item.notes)
    .bind(&updated)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DomainError::ItemNotFound(item.id.clone()));
    }
    Ok(())
}

async fn delete_item(conn: &mut SqliteConnection, item_id: &str) -> DomainResult<()> {
    let result = sqlx::query("DELETE FROM scheduled_items WHERE id = ?")
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DomainError::ItemNotFound(item_id.to_string()));
    }
    Ok(())
}

async fn insert_snapshot(conn: &mut SqliteConnection, snapshot: &CapacitySnapshot) -> DomainResult<()> {
    sqlx::query(
        "INSERT INTO capacity_snapshots
         (user_id, period_type, period_key, limit_hours, scheduled_hours, utilization_rate, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&snapshot.user_id)
    .bind(snapshot.period_type.as_str())
    .bind(&snapshot.period_key)
    .bind(snapshot.limit_hours)
    .bind(snapshot.scheduled_hours)
    .bind(snapshot.utilization_rate)
    .bind(snapshot.recorded_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl SchedulePersistence for SqliteSchedulePersistence {
    async fn add_item(&self, item: &ScheduledItem) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_item(&mut conn, item).await
    }

    async fn remove_item(&self, item_id: &str) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete_item(&mut conn, item_id).await
    }

    async fn update_item(&self, item: &ScheduledItem) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        replace_item(&mut conn, item).await
    }

    async fn write_capacity_snapshot(&self, snapshot: &CapacitySnapshot) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_snapshot(&mut conn, snapshot).await
    }

    async fn load_all_items(&self, user_id: &str) -> DomainResult<Vec<ScheduledItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, user_id, plan_id, title, start_time, end_time, estimated_minutes,
                    status, cycle_id, occurrence_id, priority, tags, notes
             FROM scheduled_items WHERE user_id = ? ORDER BY start_time ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_item).collect()
    }

    /// One transaction for the whole change; dropping it uncommitted rolls
    /// every write back.
    #[instrument(skip(self, change), fields(user_id = %change.user_id))]
    async fn persist_change(&self, change: &PersistenceChange) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        for item in &change.added {
            insert_item(&mut tx, item).await?;
        }
        for (_, item) in &change.updated {
            replace_item(&mut tx, item).await?;
        }
        for item in &change.removed {
            delete_item(&mut tx, &item.id).await?;
        }
        for snapshot in &change.snapshots {
            insert_snapshot(&mut tx, snapshot).await?;
        }

        tx.commit().await?;
        debug!(
            added = change.added.len(),
            updated = change.updated.len(),
            removed = change.removed.len(),
            snapshots = change.snapshots.len(),
            "change committed"
        );
        Ok(())
    }
}
