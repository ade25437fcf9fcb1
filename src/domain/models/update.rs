//! Mutation outcomes: update results, failure kinds, change impact and
//! undo history entries.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::capacity::{date_key, CapacityChanges};
use super::scheduled_item::ScheduledItem;
use super::slot::TimeSlot;
use super::validation::{BatchValidation, ValidationResult};
use super::world_state::WorldState;

/// Kind of mutation performed by the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Add,
    Update,
    Remove,
    ApplyPlan,
    Undo,
    Resync,
}

impl UpdateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::ApplyPlan => "apply_plan",
            Self::Undo => "undo",
            Self::Resync => "resync",
        }
    }
}

/// An alternative slot offered when an item could not be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
    pub reason: String,
    pub confidence: f64,
}

impl SuggestedSlot {
    pub fn from_slot(slot: &TimeSlot) -> Self {
        Self {
            start: slot.start,
            end: slot.end,
            duration_minutes: slot.duration_minutes,
            reason: format!(
                "Available slot on {}, {}",
                slot.day_of_week,
                slot.date.format("%B %d")
            ),
            confidence: 0.9,
        }
    }
}

/// Why a mutation did not happen.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateFailure {
    #[error("Item validation failed: {}", .result.conflicts.join("; "))]
    Validation {
        result: ValidationResult,
        suggested_slots: Vec<SuggestedSlot>,
    },

    #[error("Plan validation failed for items: {}", .invalid_item_ids.join(", "))]
    BatchValidation {
        invalid_item_ids: Vec<String>,
        validation: BatchValidation,
    },

    #[error("Plan items conflict with each other: {}", .item_ids.join(", "))]
    InternalBatchConflict {
        item_ids: Vec<String>,
        validation: BatchValidation,
    },

    #[error("Item {item_id} not found")]
    NotFound { item_id: String },

    #[error("Item {item_id} is already scheduled")]
    DuplicateItem { item_id: String },

    #[error("Invalid item {item_id}: {reason}")]
    InvalidItem { item_id: String, reason: String },

    #[error("Persistence failed: {message}")]
    Persistence {
        message: String,
        affected_dates: Vec<NaiveDate>,
    },

    #[error("Nothing to undo")]
    NothingToUndo,
}

/// Result of one engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub action: UpdateAction,
    pub affected_item_ids: Vec<String>,
    pub validation: Option<ValidationResult>,
    pub capacity_changes: CapacityChanges,
    /// Cache keys made stale by this operation.
    pub invalidated_cache_keys: Vec<String>,
    /// Warnings surfaced even on success (capacity, breaks).
    pub warnings: Vec<String>,
    pub failure: Option<UpdateFailure>,
    /// Set when a failure after mutation restored the pre-operation snapshot.
    pub rollback_performed: bool,
    /// Human-readable note, e.g. what an undo reverted.
    pub message: Option<String>,
}

impl UpdateResult {
    pub fn success(action: UpdateAction, affected_item_ids: Vec<String>) -> Self {
        Self {
            action,
            affected_item_ids,
            validation: None,
            capacity_changes: CapacityChanges::default(),
            invalidated_cache_keys: Vec::new(),
            warnings: Vec::new(),
            failure: None,
            rollback_performed: false,
            message: None,
        }
    }

    pub fn failed(action: UpdateAction, failure: UpdateFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::success(action, Vec::new())
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Alternative slots attached to a validation failure.
    pub fn suggested_slots(&self) -> &[SuggestedSlot] {
        match &self.failure {
            Some(UpdateFailure::Validation { suggested_slots, .. }) => suggested_slots,
            _ => &[],
        }
    }
}

/// What a mutation touches, computed before it is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeImpact {
    pub affected_dates: BTreeSet<NaiveDate>,
    pub affected_weeks: BTreeSet<String>,
    pub conflicting_item_ids: BTreeSet<String>,
    pub cache_keys: BTreeSet<String>,
    pub notify_learning_hook: bool,
}

impl ChangeImpact {
    pub fn merge(mut self, other: Self) -> Self {
        self.affected_dates.extend(other.affected_dates);
        self.affected_weeks.extend(other.affected_weeks);
        self.conflicting_item_ids.extend(other.conflicting_item_ids);
        self.cache_keys.extend(other.cache_keys);
        self.notify_learning_hook |= other.notify_learning_hook;
        self
    }

    /// Cache keys that go stale when `date` (in ISO week `week`) changes.
    pub fn cache_keys_for(date: NaiveDate, week: &str) -> [String; 3] {
        let day = date_key(date);
        [
            format!("slots_{day}"),
            format!("availability_{day}"),
            format!("capacity_{week}"),
        ]
    }
}

/// A reversible past mutation with full before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoOperation {
    pub sequence: u64,
    pub action: UpdateAction,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub before: WorldState,
    pub after: WorldState,
    /// The items the operation carried.
    pub payload: Vec<ScheduledItem>,
}

impl UndoOperation {
    pub fn summary(&self) -> UndoSummary {
        UndoSummary {
            sequence: self.sequence,
            action: self.action,
            timestamp: self.timestamp,
            description: self.description.clone(),
        }
    }
}

/// Lightweight view of an undo entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoSummary {
    pub sequence: u64,
    pub action: UpdateAction,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        let failure = UpdateFailure::NotFound { item_id: "x1".into() };
        assert_eq!(failure.to_string(), "Item x1 not found");

        let mut result = ValidationResult::valid();
        result.add_conflict("Time conflict with item 'A' (a)");
        let failure = UpdateFailure::Validation {
            result,
            suggested_slots: Vec::new(),
        };
        assert_eq!(
            failure.to_string(),
            "Item validation failed: Time conflict with item 'A' (a)"
        );
    }

    #[test]
    fn test_impact_merge() {
        let date = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
        let mut first = ChangeImpact::default();
        first.affected_dates.insert(date);
        first.cache_keys.extend(ChangeImpact::cache_keys_for(date, "2030-W10"));

        let mut second = ChangeImpact {
            notify_learning_hook: true,
            ..ChangeImpact::default()
        };
        second.affected_dates.insert(date);
        second.conflicting_item_ids.insert("other".into());

        let merged = first.merge(second);
        assert_eq!(merged.affected_dates.len(), 1);
        assert_eq!(merged.cache_keys.len(), 3);
        assert!(merged.cache_keys.contains("slots_2030-03-04"));
        assert!(merged.notify_learning_hook);
    }

    #[test]
    fn test_result_helpers() {
        let ok = UpdateResult::success(UpdateAction::Add, vec!["a".into()]);
        assert!(ok.is_success());
        assert!(ok.error_message().is_none());

        let failed = UpdateResult::failed(UpdateAction::Undo, UpdateFailure::NothingToUndo);
        assert!(!failed.is_success());
        assert_eq!(failed.error_message().as_deref(), Some("Nothing to undo"));
        assert!(failed.suggested_slots().is_empty());
    }
}
