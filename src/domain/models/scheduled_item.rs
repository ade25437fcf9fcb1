//! Scheduled item domain model.
//!
//! A ScheduledItem is a single time-boxed unit of work with a fixed
//! start and end, owned by one user and one plan.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle status of a scheduled item.
///
/// Transitions are driven by callers; the engine only stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Overdue,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Overdue => "overdue",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// A single time-boxed unit of work on a user's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Estimated effort in minutes; drives capacity tallies.
    pub estimated_minutes: u32,
    #[serde(default)]
    pub status: ItemStatus,

    // -- Grouping --
    #[serde(default)]
    pub cycle_id: Option<String>,
    #[serde(default)]
    pub occurrence_id: Option<String>,

    // -- Metadata --
    /// 1 (lowest) to 5 (highest).
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ScheduledItem {
    /// Create a new item spanning `start..end`; the estimate defaults to
    /// the span length.
    pub fn new(
        user_id: impl Into<String>,
        plan_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let minutes = (end - start).num_minutes().max(0);
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            plan_id: plan_id.into(),
            title: title.into(),
            start,
            end,
            estimated_minutes: u32::try_from(minutes).unwrap_or(u32::MAX),
            status: ItemStatus::Scheduled,
            cycle_id: None,
            occurrence_id: None,
            priority: None,
            tags: Vec::new(),
            notes: None,
        }
    }

    // Builder methods
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_cycle(mut self, cycle_id: impl Into<String>, occurrence_id: Option<String>) -> Self {
        self.cycle_id = Some(cycle_id.into());
        self.occurrence_id = occurrence_id;
        self
    }

    /// Wall-clock span of the item.
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Estimated effort in hours, the unit capacity tallies use.
    pub fn estimated_hours(&self) -> f64 {
        f64::from(self.estimated_minutes) / 60.0
    }

    /// Half-open interval overlap: `startA < endB && startB < endA`.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Overlap with an arbitrary interval.
    pub fn overlaps_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    /// Short label used in conflict messages.
    pub fn label(&self) -> String {
        format!("'{}' ({})", self.title, self.id)
    }

    /// Check the structural invariants every stored item must satisfy.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let fail = |reason: &str| {
            Err(DomainError::InvalidItem {
                item_id: self.id.clone(),
                reason: reason.to_string(),
            })
        };

        if self.id.trim().is_empty() {
            return fail("id cannot be empty");
        }
        if self.end <= self.start {
            return fail("end must be strictly after start");
        }
        if self.estimated_minutes == 0 {
            return fail("estimated minutes must be positive");
        }
        if let Some(priority) = self.priority {
            if !(1..=5).contains(&priority) {
                return fail("priority must be between 1 and 5");
            }
        }
        Ok(())
    }
}
