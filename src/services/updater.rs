//! The single writer of a user's WorldState.
//!
//! Every write follows the same sequence: snapshot, validate, analyse
//! impact, mutate, recompute capacity for the affected periods, persist,
//! report stale cache keys, notify the learning hook, record undo. A
//! failure before the mutation leaves the state untouched; a persistence
//! failure after it restores the snapshot.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::slot_query::SlotQueryEngine;
use super::undo_history::UndoHistory;
use super::validator::WorldValidator;
use crate::domain::errors::DomainError;
use crate::domain::models::{
    date_key, week_key, CapacityChanges, ChangeImpact, LearningEvent, ScheduledItem, SchedulingConfig,
    SlotQuery, SuggestedSlot, UndoOperation, UndoSummary, UpdateAction, UpdateFailure,
    UpdateResult, ValidationResult, WorldState,
};
use crate::domain::ports::{
    LearningHook, NullLearningHook, PersistenceChange, SchedulePersistence,
};

/// A mutation that passed validation and is ready to commit.
struct PreparedChange {
    action: UpdateAction,
    op_id: u64,
    before: WorldState,
    impact: ChangeImpact,
    change: PersistenceChange,
    capacity_changes: CapacityChanges,
    validation: Option<ValidationResult>,
    warnings: Vec<String>,
    payload: Vec<ScheduledItem>,
    description: String,
    learning_event: Option<LearningEvent>,
}

/// Transactional mutator for one user's world.
pub struct WorldUpdater {
    state: WorldState,
    validator: WorldValidator,
    slots: SlotQueryEngine,
    persistence: Arc<dyn SchedulePersistence>,
    learning: Arc<dyn LearningHook>,
    history: UndoHistory,
    max_suggestions: usize,
    suggestion_window_days: u32,
    next_op_id: u64,
}

impl WorldUpdater {
    pub fn new(state: WorldState, persistence: Arc<dyn SchedulePersistence>) -> Self {
        Self::with_config(state, persistence, &SchedulingConfig::default())
    }

    pub fn with_config(
        state: WorldState,
        persistence: Arc<dyn SchedulePersistence>,
        config: &SchedulingConfig,
    ) -> Self {
        Self {
            state,
            validator: WorldValidator::new(config),
            slots: SlotQueryEngine::from_config(config),
            persistence,
            learning: Arc::new(NullLearningHook),
            history: UndoHistory::new(config.undo_history_limit),
            max_suggestions: config.max_suggestions,
            suggestion_window_days: config.suggestion_window_days,
            next_op_id: 1,
        }
    }

    pub fn with_learning_hook(mut self, hook: Arc<dyn LearningHook>) -> Self {
        self.learning = hook;
        self
    }

    /// Replace the slot engine used for suggestions (and by the validator).
    pub fn with_slot_engine(mut self, slots: SlotQueryEngine) -> Self {
        self.validator = self.validator.with_slot_engine(slots.clone());
        self.slots = slots;
        self
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn validator(&self) -> &WorldValidator {
        &self.validator
    }

    pub fn slot_engine(&self) -> &SlotQueryEngine {
        &self.slots
    }

    /// Undo entries, most recent first.
    pub fn undo_history(&self) -> Vec<UndoSummary> {
        self.history.summaries()
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Schedule a new item.
    #[instrument(skip(self, item), fields(user_id = %self.state.user_id, item_id = %item.id))]
    pub async fn add(&mut self, item: ScheduledItem) -> UpdateResult {
        let op_id = self.begin(UpdateAction::Add);

        if let Some(failure) = self.check_item(&item) {
            return self.reject(op_id, UpdateAction::Add, failure);
        }
        if self.state.contains(&item.id) {
            let failure = UpdateFailure::DuplicateItem { item_id: item.id.clone() };
            return self.reject(op_id, UpdateAction::Add, failure);
        }

        let before = self.state.clone();
        let validation = self.validator.validate(&item, &self.state);
        if !validation.is_valid {
            let suggested_slots = self.alternatives_if_conflicting(&item, &validation);
            let failure = UpdateFailure::Validation { result: validation, suggested_slots };
            return self.reject(op_id, UpdateAction::Add, failure);
        }

        let impact = self.impact_of(&[&item], true);
        self.state.items.push(item.clone());
        let capacity_changes = self.recalculate(&impact);

        let mut change = PersistenceChange::new(self.state.user_id.clone());
        change.added.push(item.clone());

        let prepared = PreparedChange {
            action: UpdateAction::Add,
            op_id,
            before,
            impact,
            change,
            capacity_changes,
            warnings: validation.warnings.clone(),
            validation: Some(validation),
            description: format!("Add {}", item.label()),
            learning_event: Some(LearningEvent::for_item(UpdateAction::Add, &item, self.state.timezone())),
            payload: vec![item],
        };
        self.commit(prepared).await
    }

    /// Replace an existing item (matched by id).
    #[instrument(skip(self, item), fields(user_id = %self.state.user_id, item_id = %item.id))]
    pub async fn update(&mut self, item: ScheduledItem) -> UpdateResult {
        let op_id = self.begin(UpdateAction::Update);

        if let Some(failure) = self.check_item(&item) {
            return self.reject(op_id, UpdateAction::Update, failure);
        }
        let Some(previous) = self.state.item(&item.id).cloned() else {
            let failure = UpdateFailure::NotFound { item_id: item.id.clone() };
            return self.reject(op_id, UpdateAction::Update, failure);
        };

        let before = self.state.clone();
        let validation = self.validator.validate(&item, &self.state);
        if !validation.is_valid {
            let suggested_slots = self.alternatives_if_conflicting(&item, &validation);
            let failure = UpdateFailure::Validation { result: validation, suggested_slots };
            return self.reject(op_id, UpdateAction::Update, failure);
        }

        let impact = self.impact_of(&[&previous, &item], true);
        if let Some(slot) = self.state.items.iter_mut().find(|i| i.id == item.id) {
            *slot = item.clone();
        }
        let capacity_changes = self.recalculate(&impact);

        let mut change = PersistenceChange::new(self.state.user_id.clone());
        change.updated.push((previous, item.clone()));

        let prepared = PreparedChange {
            action: UpdateAction::Update,
            op_id,
            before,
            impact,
            change,
            capacity_changes,
            warnings: validation.warnings.clone(),
            validation: Some(validation),
            description: format!("Update {}", item.label()),
            learning_event: Some(LearningEvent::for_item(UpdateAction::Update, &item, self.state.timezone())),
            payload: vec![item],
        };
        self.commit(prepared).await
    }

    /// Remove an item by id.
    #[instrument(skip(self), fields(user_id = %self.state.user_id))]
    pub async fn remove(&mut self, item_id: &str) -> UpdateResult {
        let op_id = self.begin(UpdateAction::Remove);

        let Some(removed) = self.state.item(item_id).cloned() else {
            let failure = UpdateFailure::NotFound { item_id: item_id.to_string() };
            return self.reject(op_id, UpdateAction::Remove, failure);
        };

        let before = self.state.clone();
        let impact = self.impact_of(&[&removed], false);
        self.state.items.retain(|i| i.id != item_id);
        let capacity_changes = self.recalculate(&impact);

        let mut change = PersistenceChange::new(self.state.user_id.clone());
        change.removed.push(removed.clone());

        let prepared = PreparedChange {
            action: UpdateAction::Remove,
            op_id,
            before,
            impact,
            change,
            capacity_changes,
            validation: None,
            warnings: Vec::new(),
            description: format!("Remove {}", removed.label()),
            learning_event: None,
            payload: vec![removed],
        };
        self.commit(prepared).await
    }

    /// Add a batch of new items as one all-or-nothing unit.
    #[instrument(skip(self, items), fields(user_id = %self.state.user_id, plan_size = items.len()))]
    pub async fn apply_plan(&mut self, items: Vec<ScheduledItem>) -> UpdateResult {
        let op_id = self.begin(UpdateAction::ApplyPlan);

        if items.is_empty() {
            let mut result = UpdateResult::success(UpdateAction::ApplyPlan, Vec::new());
            result.message = Some("Empty plan, nothing applied".to_string());
            return result;
        }

        let mut seen = HashSet::new();
        for item in &items {
            if let Some(failure) = self.check_item(item) {
                return self.reject(op_id, UpdateAction::ApplyPlan, failure);
            }
            if !seen.insert(item.id.as_str()) || self.state.contains(&item.id) {
                let failure = UpdateFailure::DuplicateItem { item_id: item.id.clone() };
                return self.reject(op_id, UpdateAction::ApplyPlan, failure);
            }
        }

        let before = self.state.clone();
        let batch = self.validator.validate_batch(&items, &self.state);
        if !batch.internal_conflicts.is_empty() {
            let failure = UpdateFailure::InternalBatchConflict {
                item_ids: batch.internally_conflicting_ids(),
                validation: batch,
            };
            return self.reject(op_id, UpdateAction::ApplyPlan, failure);
        }
        if !batch.is_valid() {
            let failure = UpdateFailure::BatchValidation {
                invalid_item_ids: batch.invalid_item_ids(),
                validation: batch,
            };
            return self.reject(op_id, UpdateAction::ApplyPlan, failure);
        }

        let warnings: Vec<String> = batch
            .items
            .iter()
            .flat_map(|v| v.result.warnings.iter().map(move |w| format!("{}: {w}", v.item_id)))
            .collect();

        let refs: Vec<&ScheduledItem> = items.iter().collect();
        let impact = self.impact_of(&refs, true);
        self.state.items.extend(items.iter().cloned());
        let capacity_changes = self.recalculate(&impact);

        let mut change = PersistenceChange::new(self.state.user_id.clone());
        change.added.clone_from(&items);

        let prepared = PreparedChange {
            action: UpdateAction::ApplyPlan,
            op_id,
            before,
            impact,
            change,
            capacity_changes,
            validation: None,
            warnings,
            description: format!("Apply plan of {} items", items.len()),
            learning_event: Some(LearningEvent::for_plan(&self.state.user_id, &items, self.state.timezone())),
            payload: items,
        };
        self.commit(prepared).await
    }

    /// Revert the most recent recorded operation.
    ///
    /// Storage is brought back in line with the restored item set first; if
    /// that fails the entry goes back on the history and nothing changes.
    /// Undo itself is not recorded.
    #[instrument(skip(self), fields(user_id = %self.state.user_id))]
    pub async fn undo(&mut self) -> UpdateResult {
        let op_id = self.begin(UpdateAction::Undo);

        let Some(entry) = self.history.pop() else {
            return self.reject(op_id, UpdateAction::Undo, UpdateFailure::NothingToUndo);
        };

        let mut change = PersistenceChange::diff(
            self.state.user_id.clone(),
            &self.state.items,
            &entry.before.items,
        );
        let touched: Vec<&ScheduledItem> = change
            .added
            .iter()
            .chain(change.updated.iter().flat_map(|(old, new)| [old, new]))
            .chain(change.removed.iter())
            .collect();
        let impact = self.impact_of(&touched, false);
        let capacity_changes = restored_tallies(&entry.before, &impact);
        change.snapshots =
            capacity_changes.snapshots(&self.state.user_id, &entry.before.capacity.constraints);

        if change.touches_items() {
            if let Err(err) = self.persistence.persist_change(&change).await {
                error!(op_id, error = %err, sequence = entry.sequence, "undo failed to persist, history kept");
                let failure = UpdateFailure::Persistence {
                    message: err.to_string(),
                    affected_dates: impact.affected_dates.iter().copied().collect(),
                };
                self.history.push(entry);
                return UpdateResult::failed(UpdateAction::Undo, failure);
            }
        }

        let version = self.state.version + 1;
        self.state = entry.before.clone();
        self.state.version = version;
        self.state.last_updated = Utc::now();

        info!(op_id, sequence = entry.sequence, description = %entry.description, "operation undone");

        let mut result = UpdateResult::success(UpdateAction::Undo, change.item_ids());
        result.capacity_changes = capacity_changes;
        result.invalidated_cache_keys = impact.cache_keys.into_iter().collect();
        result.message = Some(format!("Undid: {}", entry.description));
        result
    }

    /// Rebuild the item set from storage and recompute every tally.
    ///
    /// Clears the undo history: its snapshots no longer describe storage.
    #[instrument(skip(self), fields(user_id = %self.state.user_id))]
    pub async fn resync_from_storage(&mut self) -> UpdateResult {
        let op_id = self.begin(UpdateAction::Resync);

        let loaded = match self.persistence.load_all_items(&self.state.user_id).await {
            Ok(items) => items,
            Err(err) => {
                error!(op_id, error = %err, "failed to load items from storage");
                let failure = UpdateFailure::Persistence {
                    message: err.to_string(),
                    affected_dates: Vec::new(),
                };
                return UpdateResult::failed(UpdateAction::Resync, failure);
            }
        };

        let mut warnings = Vec::new();
        let mut items = Vec::with_capacity(loaded.len());
        for item in loaded {
            match item.check_invariants() {
                Ok(()) => items.push(item),
                Err(err) => {
                    warn!(op_id, item_id = %item.id, error = %err, "skipping invalid stored item");
                    warnings.push(format!("Skipped stored item {}: {err}", item.id));
                }
            }
        }

        let tz = self.state.timezone();
        self.state.capacity.recalculate_all(&items, tz);
        self.state.items = items;
        self.state.version += 1;
        self.state.last_updated = Utc::now();
        self.history.clear();

        let report = self.validator.validate_world(&self.state);
        for entry in report.items.iter().filter(|v| !v.result.is_valid) {
            warn!(op_id, item_id = %entry.item_id, conflicts = ?entry.result.conflicts, "stored item is inconsistent");
            warnings.push(format!(
                "Stored item {} is inconsistent: {}",
                entry.item_id,
                entry.result.conflicts.join("; ")
            ));
        }

        info!(op_id, items = self.state.items.len(), "world state resynced from storage");

        let ids = self.state.items.iter().map(|i| i.id.clone()).collect();
        let mut result = UpdateResult::success(UpdateAction::Resync, ids);
        result.warnings = warnings;
        result.message = Some(format!("Loaded {} items", self.state.items.len()));
        result
    }

    fn begin(&mut self, action: UpdateAction) -> u64 {
        let op_id = self.next_op_id;
        self.next_op_id += 1;
        debug!(op_id, action = action.as_str(), "operation started");
        op_id
    }

    fn reject(&self, op_id: u64, action: UpdateAction, failure: UpdateFailure) -> UpdateResult {
        info!(op_id, action = action.as_str(), reason = %failure, "operation rejected");
        UpdateResult::failed(action, failure)
    }

    fn check_item(&self, item: &ScheduledItem) -> Option<UpdateFailure> {
        if let Err(err) = item.check_invariants() {
            let reason = match err {
                DomainError::InvalidItem { reason, .. } => reason,
                other => other.to_string(),
            };
            return Some(UpdateFailure::InvalidItem {
                item_id: item.id.clone(),
                reason,
            });
        }
        if item.user_id != self.state.user_id {
            return Some(UpdateFailure::InvalidItem {
                item_id: item.id.clone(),
                reason: format!("item belongs to user {}", item.user_id),
            });
        }
        None
    }

    /// Dates, weeks, overlapping items and cache keys touched by `items`.
    fn impact_of(&self, items: &[&ScheduledItem], notify_learning_hook: bool) -> ChangeImpact {
        let tz = self.state.timezone();
        let ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        let mut impact = ChangeImpact {
            notify_learning_hook,
            ..ChangeImpact::default()
        };

        for item in items {
            impact.affected_dates.extend(local_dates(item, tz));
            impact.conflicting_item_ids.extend(
                self.state
                    .items
                    .iter()
                    .filter(|other| !ids.contains(other.id.as_str()) && other.overlaps(item))
                    .map(|other| other.id.clone()),
            );
        }

        for &date in &impact.affected_dates {
            let week = week_key(date);
            impact.cache_keys.extend(ChangeImpact::cache_keys_for(date, &week));
            impact.affected_weeks.insert(week);
        }

        impact
    }

    fn recalculate(&mut self, impact: &ChangeImpact) -> CapacityChanges {
        let tz = self.state.timezone();
        self.state
            .capacity
            .recalculate(&self.state.items, &impact.affected_dates, tz)
    }

    fn alternatives_if_conflicting(
        &self,
        item: &ScheduledItem,
        validation: &ValidationResult,
    ) -> Vec<SuggestedSlot> {
        if !validation.has_time_conflicts() {
            return Vec::new();
        }

        let date = self.state.local_date(item.start);
        let end = date
            .checked_add_days(chrono::Days::new(u64::from(self.suggestion_window_days)))
            .unwrap_or(date);
        let minutes = u32::try_from(item.span().num_minutes()).unwrap_or(0);
        let query = SlotQuery::new(minutes)
            .between(date, end)
            .ignoring_item(item.id.clone())
            .with_max_results(self.max_suggestions);

        let suggestions: Vec<SuggestedSlot> = self
            .slots
            .find_available_slots(&self.state, &query)
            .slots
            .iter()
            .map(SuggestedSlot::from_slot)
            .collect();
        debug!(item_id = %item.id, found = suggestions.len(), "alternative slots found");
        suggestions
    }

    /// Persist, then finish or roll back.
    async fn commit(&mut self, prepared: PreparedChange) -> UpdateResult {
        let PreparedChange {
            action,
            op_id,
            before,
            impact,
            mut change,
            capacity_changes,
            validation,
            warnings,
            payload,
            description,
            learning_event,
        } = prepared;

        change.snapshots =
            capacity_changes.snapshots(&self.state.user_id, &self.state.capacity.constraints);

        if let Err(err) = self.persistence.persist_change(&change).await {
            error!(op_id, action = action.as_str(), error = %err, "persistence failed, rolling back");
            self.state = before;
            let mut result = UpdateResult::failed(
                action,
                UpdateFailure::Persistence {
                    message: err.to_string(),
                    affected_dates: impact.affected_dates.iter().copied().collect(),
                },
            );
            result.validation = validation;
            result.rollback_performed = true;
            return result;
        }

        self.state.version += 1;
        self.state.last_updated = Utc::now();

        if impact.notify_learning_hook {
            if let Some(event) = &learning_event {
                if let Err(err) = self.learning.record(event) {
                    warn!(op_id, error = %err, "learning hook failed");
                }
            }
        }

        let affected_item_ids: Vec<String> = payload.iter().map(|i| i.id.clone()).collect();
        self.history.push(UndoOperation {
            sequence: op_id,
            action,
            timestamp: Utc::now(),
            description: description.clone(),
            before,
            after: self.state.clone(),
            payload,
        });

        info!(
            op_id,
            action = action.as_str(),
            version = self.state.version,
            affected_dates = impact.affected_dates.len(),
            %description,
            "operation committed"
        );

        let mut result = UpdateResult::success(action, affected_item_ids);
        result.validation = validation;
        result.capacity_changes = capacity_changes;
        result.invalidated_cache_keys = impact.cache_keys.into_iter().collect();
        result.warnings = warnings;
        result
    }
}

/// Local dates an item occupies, from its start date through its end date.
/// An item ending exactly at local midnight does not touch the next day.
fn local_dates(item: &ScheduledItem, tz: chrono_tz::Tz) -> Vec<NaiveDate> {
    let first = item.start.with_timezone(&tz).date_naive();
    let last_instant = item.end - chrono::Duration::nanoseconds(1);
    let last = last_instant.with_timezone(&tz).date_naive().max(first);
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// The before-snapshot's tallies for every period in `impact`.
fn restored_tallies(before: &WorldState, impact: &ChangeImpact) -> CapacityChanges {
    let weeks: BTreeSet<String> = impact.affected_dates.iter().map(|&d| week_key(d)).collect();
    CapacityChanges {
        daily: impact
            .affected_dates
            .iter()
            .map(|&d| (date_key(d), before.capacity.daily_hours(d)))
            .collect(),
        weekly: weeks
            .into_iter()
            .map(|w| {
                let hours = before.capacity.weekly_load.get(&w).copied().unwrap_or(0.0);
                (w, hours)
            })
            .collect(),
    }
}
