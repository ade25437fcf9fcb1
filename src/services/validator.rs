//! Read-only feasibility checks for candidate items.
//!
//! Every check runs even when an earlier one fails so the caller sees the
//! complete picture: time conflicts, capacity, availability, then
//! suggestions.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::slot_query::SlotQueryEngine;
use crate::domain::models::availability::{minute_of_day, MINUTES_PER_DAY};
use crate::domain::models::{
    week_key, BatchValidation, CapacityPolicy, DayOfWeek, InternalConflict, ItemValidation,
    ResolvedAvailability, ScheduledItem, SchedulingConfig, SlotQuery, TimeRange, ValidationResult,
    WorldState,
};

/// Validates items against a world state.
#[derive(Debug, Clone)]
pub struct WorldValidator {
    policy: CapacityPolicy,
    suggestion_window_days: u32,
    overload_threshold: f64,
    slots: SlotQueryEngine,
}

impl Default for WorldValidator {
    fn default() -> Self {
        Self::new(&SchedulingConfig::default())
    }
}

impl WorldValidator {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            policy: config.capacity_policy,
            suggestion_window_days: config.suggestion_window_days,
            overload_threshold: config.overload_threshold,
            slots: SlotQueryEngine::from_config(config),
        }
    }

    /// Use a specific slot engine for "next available" suggestions.
    pub fn with_slot_engine(mut self, slots: SlotQueryEngine) -> Self {
        self.slots = slots;
        self
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// Validate one candidate. An existing item with the same id is treated
    /// as the candidate's previous version and ignored.
    pub fn validate(&self, item: &ScheduledItem, state: &WorldState) -> ValidationResult {
        let mut result = self.check(item, state);
        self.suggest(item, state, &mut result);
        result
    }

    /// Validate a batch of new items against the state and each other.
    ///
    /// Items are checked in order, each against the state plus the earlier
    /// batch items, so capacity, item counts and breaks see the whole plan.
    /// Overlaps inside the batch are reported once, as internal conflicts.
    pub fn validate_batch(&self, items: &[ScheduledItem], state: &WorldState) -> BatchValidation {
        let mut batch = BatchValidation {
            items: items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let earlier: Vec<&ScheduledItem> =
                        items[..i].iter().filter(|other| !other.overlaps(item)).collect();
                    ItemValidation {
                        item_id: item.id.clone(),
                        result: self.validate(item, &with_batch_items(state, &earlier)),
                    }
                })
                .collect(),
            internal_conflicts: Vec::new(),
        };

        for (i, first) in items.iter().enumerate() {
            for (j, second) in items.iter().enumerate().skip(i + 1) {
                if !first.overlaps(second) {
                    continue;
                }
                batch.internal_conflicts.push(InternalConflict {
                    first_id: first.id.clone(),
                    second_id: second.id.clone(),
                });
                batch.items[i]
                    .result
                    .add_conflict(format!("Internal conflict with item {}", second.label()));
                batch.items[j]
                    .result
                    .add_conflict(format!("Internal conflict with item {}", first.label()));
            }
        }

        batch
    }

    /// Re-check every committed item against the rest of the world.
    ///
    /// Suggestions are skipped; this is a consistency report.
    pub fn validate_world(&self, state: &WorldState) -> BatchValidation {
        BatchValidation {
            items: state
                .items()
                .iter()
                .map(|item| ItemValidation {
                    item_id: item.id.clone(),
                    result: self.check(item, state),
                })
                .collect(),
            internal_conflicts: Vec::new(),
        }
    }

    fn check(&self, item: &ScheduledItem, state: &WorldState) -> ValidationResult {
        let mut result = ValidationResult::valid();
        check_time_conflicts(item, state, &mut result);
        self.check_capacity(item, state, &mut result);
        check_availability(item, state, &mut result);
        result
    }

    fn check_capacity(&self, item: &ScheduledItem, state: &WorldState, result: &mut ValidationResult) {
        let capacity = state.capacity();
        let limits = &capacity.constraints;
        let date = state.local_date(item.start);
        let hours = item.estimated_hours();

        // The previous version of an updated item must not count twice.
        let previous = state.item(&item.id);
        let previous_daily = previous
            .filter(|p| state.local_date(p.start) == date)
            .map_or(0.0, ScheduledItem::estimated_hours);
        let previous_weekly = previous
            .filter(|p| week_key(state.local_date(p.start)) == week_key(date))
            .map_or(0.0, ScheduledItem::estimated_hours);

        let mut issues = Vec::new();

        let daily = capacity.daily_hours(date) - previous_daily + hours;
        if daily > limits.max_hours_per_day {
            issues.push(format!(
                "Adding this item ({hours:.1}h) would exceed daily limit ({daily:.1}h > {}h)",
                limits.max_hours_per_day
            ));
        }

        let weekly = capacity.weekly_hours(date) - previous_weekly + hours;
        if weekly > limits.max_hours_per_week {
            issues.push(format!(
                "Adding this item would exceed weekly limit ({weekly:.1}h > {}h)",
                limits.max_hours_per_week
            ));
        }

        let count = state
            .items()
            .iter()
            .filter(|other| other.id != item.id && state.local_date(other.start) == date)
            .count()
            + 1;
        if count > limits.max_items_per_day as usize {
            issues.push(format!(
                "Adding this item would exceed {} items on {date}",
                limits.max_items_per_day
            ));
        }

        for message in issues {
            match self.policy {
                CapacityPolicy::Soft => result.add_warning(message),
                CapacityPolicy::Hard => result.add_conflict(message),
            }
        }

        check_breaks(item, state, date, result);
    }

    fn suggest(&self, item: &ScheduledItem, state: &WorldState, result: &mut ValidationResult) {
        let date = state.local_date(item.start);

        if result.has_time_conflicts() {
            result.add_suggestion("Consider rescheduling to avoid conflicts");

            let minutes = u32::try_from(item.span().num_minutes()).unwrap_or(0);
            let end = date
                .checked_add_days(chrono::Days::new(u64::from(self.suggestion_window_days)))
                .unwrap_or(date);
            let query = SlotQuery::new(minutes)
                .between(date, end)
                .ignoring_item(item.id.clone())
                .with_max_results(1);
            if let Some(slot) = self.slots.find_available_slots(state, &query).slots.first() {
                result.add_suggestion(format!("Next available slot: {}", slot.describe()));
            }
        }

        if state.capacity().day_load_ratio(date) > self.overload_threshold {
            result.add_suggestion("Consider moving some items to less busy days");
        }
    }
}

/// A scratch copy of `state` holding `items` with recomputed tallies.
fn with_batch_items(state: &WorldState, items: &[&ScheduledItem]) -> WorldState {
    let mut scratch = state.clone();
    if items.is_empty() {
        return scratch;
    }
    let dates: BTreeSet<NaiveDate> = items.iter().map(|item| state.local_date(item.start)).collect();
    scratch.items.extend(items.iter().map(|&item| item.clone()));
    let tz = scratch.timezone();
    scratch.capacity.recalculate(&scratch.items, &dates, tz);
    scratch
}

fn check_time_conflicts(item: &ScheduledItem, state: &WorldState, result: &mut ValidationResult) {
    for other in state.items() {
        if other.id == item.id || !item.overlaps(other) {
            continue;
        }
        result.add_conflict(format!("Time conflict with item {}", other.label()));
        result.conflicting_item_ids.push(other.id.clone());
    }
}

/// Minimum-break and maximum-run warnings. Always advisory.
fn check_breaks(item: &ScheduledItem, state: &WorldState, date: NaiveDate, result: &mut ValidationResult) {
    let limits = &state.capacity().constraints;
    let min_break = Duration::minutes(i64::from(limits.min_break_minutes));

    let mut day: Vec<&ScheduledItem> = state
        .items()
        .iter()
        .filter(|other| other.id != item.id && state.local_date(other.start) == date)
        .filter(|other| !item.overlaps(other))
        .collect();

    for other in &day {
        let gap = if other.end <= item.start {
            item.start - other.end
        } else {
            other.start - item.end
        };
        if gap < min_break {
            result.add_warning(format!(
                "Less than {} minutes break between this item and {}",
                limits.min_break_minutes,
                other.label()
            ));
        }
    }

    // Items closer than the minimum break form one continuous block.
    day.push(item);
    day.sort_by_key(|entry| entry.start);
    let mut block: Option<(DateTime<Utc>, DateTime<Utc>, bool)> = None;
    let mut longest = Duration::zero();
    for entry in day {
        let is_candidate = entry.id == item.id;
        block = match block {
            Some((start, end, has_candidate)) if entry.start - end < min_break => {
                Some((start, end.max(entry.end), has_candidate || is_candidate))
            }
            _ => Some((entry.start, entry.end, is_candidate)),
        };
        if let Some((start, end, true)) = block {
            longest = longest.max(end - start);
        }
    }

    let run_hours = longest.num_minutes() as f64 / 60.0;
    if run_hours > limits.max_consecutive_hours {
        result.add_warning(format!(
            "Continuous work block of {run_hours:.1}h would exceed {}h without a break",
            limits.max_consecutive_hours
        ));
    }
}

/// The item's local start/end must sit inside one available range.
/// Items running past local midnight must fit the end of one day's
/// availability and the start of the next.
fn check_availability(item: &ScheduledItem, state: &WorldState, result: &mut ValidationResult) {
    let tz = state.timezone();
    let local_start = item.start.with_timezone(&tz);
    let local_end = item.end.with_timezone(&tz);
    let start_date = local_start.date_naive();
    let end_date = local_end.date_naive();
    let start_minute = minute_of_day(local_start.time());
    let end_minute = minute_of_day(local_end.time());

    let next_day = start_date.succ_opt();
    let single_day = end_date == start_date || (Some(end_date) == next_day && end_minute == 0);

    let spans: Vec<(NaiveDate, u32, u32)> = if single_day {
        let end = if end_date == start_date { end_minute } else { MINUTES_PER_DAY };
        vec![(start_date, start_minute, end)]
    } else if Some(end_date) == next_day {
        vec![(start_date, start_minute, MINUTES_PER_DAY), (end_date, 0, end_minute)]
    } else {
        result.add_conflict(format!(
            "Item spans more than two days ({} to {})",
            start_date, end_date
        ));
        return;
    };

    for (date, from, to) in spans {
        match state.resolve_availability(date, true) {
            ResolvedAvailability::Blackout { reason } => {
                result.add_conflict(format!("Item scheduled on blackout date {date}: {reason}"));
            }
            ResolvedAvailability::Ranges { ranges, .. } => {
                if !ranges.iter().any(|range| range.contains_span(from, to)) {
                    result.add_conflict(format!(
                        "Item time ({}-{}) falls outside available windows for {} {date}: {}",
                        local_start.format("%H:%M"),
                        local_end.format("%H:%M"),
                        DayOfWeek::of(date),
                        describe_ranges(&ranges)
                    ));
                }
            }
        }
    }
}

fn describe_ranges(ranges: &[TimeRange]) -> String {
    if ranges.is_empty() {
        return "none".to_string();
    }
    ranges.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
