//! Read-only free-slot search over a WorldState.
//!
//! For each date in range the engine resolves availability, clips it to the
//! query's time window and "not before" bound, then walks the existing items
//! in start order and tiles every free gap with consecutive candidate slots.
//! Candidates that would push the day over its hour limit are dropped; the
//! rest are annotated and ranked.

use std::cmp::Ordering;
use std::time::Instant;

use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::domain::models::availability::{local_minute_to_utc, minute_of_day, MINUTES_PER_DAY};
use crate::domain::models::capacity::local_date;
use crate::domain::models::{
    DayOfWeek, EnergyLevel, FocusLevel, PartOfDay, ResolvedAvailability, ScheduledItem,
    SchedulingConfig, SlotQuery, SlotQueryResult, SlotSearchMode, TaskCategory, TimeSlot,
    WorldState,
};

/// Free-slot search engine.
///
/// Never mutates the state it is given; any number of searches may run
/// against the same snapshot concurrently.
#[derive(Debug, Clone)]
pub struct SlotQueryEngine {
    default_search_days: u32,
    nearby_window: Duration,
    fixed_now: Option<DateTime<Utc>>,
}

impl Default for SlotQueryEngine {
    fn default() -> Self {
        Self::new(14, 60)
    }
}

impl SlotQueryEngine {
    pub fn new(default_search_days: u32, nearby_conflict_window_minutes: u32) -> Self {
        Self {
            default_search_days,
            nearby_window: Duration::minutes(i64::from(nearby_conflict_window_minutes)),
            fixed_now: None,
        }
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(config.default_search_days, config.nearby_conflict_window_minutes)
    }

    /// Pin "now" to a fixed instant. Slots are never offered before now.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// The very next slot of `duration_minutes` at or after `after`
    /// (default: now).
    pub fn find_next_free_slot(
        &self,
        state: &WorldState,
        duration_minutes: u32,
        after: Option<DateTime<Utc>>,
    ) -> Option<TimeSlot> {
        let after = after.unwrap_or_else(|| self.now());
        let mut query = SlotQuery::new(duration_minutes)
            .not_before(after)
            .with_max_results(1);
        query.start_date = Some(state.local_date(after));
        self.find_available_slots(state, &query).slots.into_iter().next()
    }

    /// Every open slot on one date.
    pub fn find_slots_on_date(&self, state: &WorldState, date: NaiveDate, duration_minutes: u32) -> Vec<TimeSlot> {
        let query = SlotQuery::new(duration_minutes)
            .on(date)
            .with_mode(SlotSearchMode::AllDate)
            .with_max_results(50);
        self.find_available_slots(state, &query).slots
    }

    /// Open slots across an inclusive date range.
    pub fn find_slots_in_range(
        &self,
        state: &WorldState,
        start: NaiveDate,
        end: NaiveDate,
        duration_minutes: u32,
    ) -> Vec<TimeSlot> {
        let query = SlotQuery::new(duration_minutes)
            .between(start, end)
            .with_mode(SlotSearchMode::DateRange)
            .with_max_results(100);
        self.find_available_slots(state, &query).slots
    }

    /// Whether `duration_minutes` fits anywhere on `date`, optionally
    /// inside an `earliest..latest` local window.
    pub fn can_fit(
        &self,
        state: &WorldState,
        date: NaiveDate,
        duration_minutes: u32,
        earliest: Option<NaiveTime>,
        latest: Option<NaiveTime>,
    ) -> bool {
        let query = SlotQuery::new(duration_minutes)
            .on(date)
            .with_time_window(earliest, latest)
            .with_max_results(1);
        !self.find_available_slots(state, &query).slots.is_empty()
    }

    /// Core search.
    pub fn find_available_slots(&self, state: &WorldState, query: &SlotQuery) -> SlotQueryResult {
        let timer = Instant::now();
        let version = state.version();

        if query.duration_minutes == 0 {
            return SlotQueryResult::empty(version, "Invalid duration: must be greater than 0");
        }

        let now = self.now();
        let today = state.local_date(now);
        let (start_date, end_date) = self.search_range(query, today);
        if end_date < start_date {
            return SlotQueryResult::empty(version, "Empty search range: end date before start date");
        }

        let not_before = ceil_to_minute(query.not_before.map_or(now, |t| t.max(now)));
        let mut notes = Vec::new();
        let mut candidates = Vec::new();

        let mut date = start_date;
        while date <= end_date {
            if query.exclude_weekends && DayOfWeek::of(date).is_weekend() {
                note(&mut notes, "Weekends excluded".to_string());
            } else {
                let day = self.slots_on(state, query, date, not_before, &mut notes);
                let found = !day.is_empty();
                candidates.extend(day);

                if found && query.mode == SlotSearchMode::NextAvailable {
                    break;
                }
                if query.mode != SlotSearchMode::BestFit && candidates.len() >= query.max_results {
                    break;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        let total_found = candidates.len();
        let mut slots = rank(candidates, query);
        slots.truncate(query.max_results);

        tracing::trace!(
            user_id = %state.user_id(),
            mode = query.mode.as_str(),
            duration_minutes = query.duration_minutes,
            total_found,
            returned = slots.len(),
            "slot search finished"
        );

        SlotQueryResult {
            slots,
            total_found,
            search_range_days: (end_date - start_date).num_days() + 1,
            constraints_applied: notes,
            search_time_us: timer.elapsed().as_micros(),
            world_state_version: version,
        }
    }

    fn search_range(&self, query: &SlotQuery, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        if query.mode == SlotSearchMode::AllToday {
            return (today, today);
        }
        let start = query.start_date.unwrap_or(today);
        let end = query.end_date.unwrap_or_else(|| {
            start
                .checked_add_days(chrono::Days::new(u64::from(self.default_search_days)))
                .unwrap_or(start)
        });
        (start, end)
    }

    /// Candidate slots on one local date, filtered and annotated.
    fn slots_on(
        &self,
        state: &WorldState,
        query: &SlotQuery,
        date: NaiveDate,
        not_before: DateTime<Utc>,
        notes: &mut Vec<String>,
    ) -> Vec<TimeSlot> {
        let tz = state.timezone();
        let availability = state.resolve_availability(date, query.respect_blackouts);
        if let ResolvedAvailability::Blackout { reason } = &availability {
            note(notes, format!("Blackout on {date}: {reason}"));
            return Vec::new();
        }

        let ignored = query.ignore_item_id.as_deref();
        let mut busy: Vec<&ScheduledItem> = state
            .items()
            .iter()
            .filter(|item| Some(item.id.as_str()) != ignored)
            .collect();
        busy.sort_by_key(|item| item.start);

        let duration = Duration::minutes(i64::from(query.duration_minutes));
        let buffer = Duration::minutes(i64::from(query.buffer_minutes));
        let earliest = query.earliest_time.map_or(0, minute_of_day);
        let latest = query.latest_time.map_or(MINUTES_PER_DAY, minute_of_day);

        let mut slots = Vec::new();
        for range in availability.ranges() {
            for (segment_start, segment_end) in range.day_segments() {
                let lo = segment_start.max(earliest);
                let hi = segment_end.min(latest);
                if hi <= lo {
                    continue;
                }
                let (Some(from), Some(to)) = (
                    local_minute_to_utc(tz, date, lo),
                    local_minute_to_utc(tz, date, hi),
                ) else {
                    continue;
                };
                let gaps = Gaps { busy: &busy, duration, buffer, tz };
                gaps.tile(from.max(not_before), to, &mut slots);
            }
        }

        // Overlapping availability ranges can yield the same start twice.
        slots.sort_by_key(|slot| slot.start);
        slots.dedup_by_key(|slot| slot.start);

        if query.respect_capacity {
            let capacity = state.capacity();
            let limit = capacity.constraints.max_hours_per_day;
            let own_hours: f64 = busy_on_date_excluded(state, ignored, date);
            let load = (capacity.daily_hours(date) - own_hours).max(0.0);
            let before = slots.len();
            slots.retain(|slot| load + f64::from(slot.duration_minutes) / 60.0 <= limit);
            if slots.len() < before {
                note(notes, format!("Capacity limit on {date}"));
            }
        }

        let load_ratio = state.capacity().day_load_ratio(date);
        for slot in &mut slots {
            slot.conflicts_nearby = count_nearby(&busy, slot, date, tz, self.nearby_window);
            slot.capacity_load = load_ratio;
        }

        slots
    }
}

/// Hours of the ignored item tallied under `date`, if any.
fn busy_on_date_excluded(state: &WorldState, ignored: Option<&str>, date: NaiveDate) -> f64 {
    ignored
        .and_then(|id| state.item(id))
        .filter(|item| state.local_date(item.start) == date)
        .map_or(0.0, ScheduledItem::estimated_hours)
}

struct Gaps<'a> {
    busy: &'a [&'a ScheduledItem],
    duration: Duration,
    buffer: Duration,
    tz: Tz,
}

impl Gaps<'_> {
    /// Walk busy items in start order with a moving cursor and tile each
    /// free gap in `[from, to)`.
    fn tile(&self, from: DateTime<Utc>, to: DateTime<Utc>, out: &mut Vec<TimeSlot>) {
        let mut cursor = from;
        for item in self.busy {
            let block_start = item.start - self.buffer;
            let block_end = item.end + self.buffer;
            if block_start >= to {
                break;
            }
            if block_end <= cursor {
                continue;
            }
            self.fill(cursor, block_start.min(to), out);
            cursor = cursor.max(block_end);
        }
        self.fill(cursor, to, out);
    }

    /// Split one gap into back-to-back slots. A long gap yields many
    /// candidates, so `max_results` can be exhausted by the first days
    /// of a range before later days are reached.
    fn fill(&self, from: DateTime<Utc>, to: DateTime<Utc>, out: &mut Vec<TimeSlot>) {
        let mut start = from;
        while start + self.duration <= to {
            out.push(TimeSlot::from_range(start, start + self.duration, self.tz));
            start = start + self.duration + self.buffer;
        }
    }
}

fn count_nearby(
    busy: &[&ScheduledItem],
    slot: &TimeSlot,
    date: NaiveDate,
    tz: Tz,
    window: Duration,
) -> u32 {
    let count = busy
        .iter()
        .filter(|item| local_date(item.start, tz) == date)
        .filter(|item| item.start <= slot.end + window && item.end >= slot.start - window)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn note(notes: &mut Vec<String>, message: String) {
    if !notes.contains(&message) {
        notes.push(message);
    }
}

fn ceil_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    if instant.second() == 0 && instant.nanosecond() == 0 {
        return instant;
    }
    instant
        .duration_trunc(Duration::minutes(1))
        .map_or(instant, |floor| floor + Duration::minutes(1))
}

/// Score contributed by semantic hints; zero when the query has none.
fn semantic_score(slot: &TimeSlot, query: &SlotQuery) -> f64 {
    let mut score = 0.0;

    match query.task_category {
        Some(TaskCategory::Creative) => score += slot.creativity_score * 500.0 + slot.energy_score * 200.0,
        Some(TaskCategory::Analytical) => score += slot.focus_score * 500.0 + slot.energy_score * 300.0,
        Some(TaskCategory::Administrative) => score += slot.energy_score * 200.0 + slot.focus_score * 100.0,
        Some(TaskCategory::Physical) => score += slot.energy_score * 600.0,
        Some(TaskCategory::Social) => {
            score += slot.energy_score * 200.0;
            if slot.is_afternoon || slot.is_evening {
                score += 200.0;
            }
        }
        None => {}
    }

    match query.energy_level {
        Some(EnergyLevel::High) => score += slot.energy_score * 400.0,
        Some(EnergyLevel::Medium) => score += slot.energy_score * 200.0,
        Some(EnergyLevel::Low) | None => {}
    }

    match query.focus_level {
        Some(FocusLevel::Deep) => score += slot.focus_score * 400.0,
        Some(FocusLevel::Moderate) => score += slot.focus_score * 200.0,
        Some(FocusLevel::Light) | None => {}
    }

    score
}

fn slot_score(slot: &TimeSlot, query: &SlotQuery) -> f64 {
    let semantic = semantic_score(slot, query);
    let has_semantic = semantic > 0.0;
    let mut score = 0.0;

    if query.mode == SlotSearchMode::NextAvailable {
        score += semantic * 0.5;
        score += if has_semantic { 50.0 } else { 100.0 };
        score -= slot.start.timestamp() as f64 / 10_000.0;
    } else {
        score += semantic;
    }

    let start_minute = i64::from(minute_of_day(slot.start_time));
    for preferred in &query.preferred_times {
        let diff = (start_minute - i64::from(minute_of_day(*preferred))).abs();
        score += (720 - diff).max(0) as f64;
    }

    let part = PartOfDay::of_hour(slot.start_time.hour());
    if query.preferred_parts_of_day.contains(&part) {
        score += 200.0;
    }

    let (conflict_weight, load_weight) = if has_semantic { (10.0, 25.0) } else { (20.0, 50.0) };
    score -= f64::from(slot.conflicts_nearby) * conflict_weight;
    score -= slot.capacity_load * load_weight;

    score
}

/// Order candidates best first.
///
/// A plain next-available search (no hints, no preferences) is strictly
/// chronological; everything else is ordered by score with the earlier
/// start winning ties.
fn rank(candidates: Vec<TimeSlot>, query: &SlotQuery) -> Vec<TimeSlot> {
    let plain = !query.has_semantic_hints()
        && query.preferred_times.is_empty()
        && query.preferred_parts_of_day.is_empty();

    if query.mode == SlotSearchMode::NextAvailable && plain {
        let mut slots = candidates;
        slots.sort_by_key(|slot| slot.start);
        return slots;
    }

    let mut scored: Vec<(f64, TimeSlot)> = candidates
        .into_iter()
        .map(|slot| (slot_score(&slot, query), slot))
        .collect();
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.start.cmp(&b.start))
    });
    scored.into_iter().map(|(_, slot)| slot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AvailabilityMap, BlackoutWindow, CapacityConstraints, DayAvailability, TimeRange,
    };
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 3, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, d, h, m, 0).unwrap()
    }

    fn item(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ScheduledItem {
        ScheduledItem::new("u1", "p1", id, start, end).with_id(id)
    }

    fn state_with(items: Vec<ScheduledItem>) -> WorldState {
        let availability =
            AvailabilityMap::working_week("u1", "UTC", TimeRange::hm(9, 0, 18, 0), false);
        WorldState::from_parts("u1", items, availability, CapacityConstraints::default(), Vec::new())
    }

    fn engine() -> SlotQueryEngine {
        SlotQueryEngine::default().with_now(at(1, 0, 0))
    }

    #[test]
    fn test_gaps_around_existing_item() {
        let state = state_with(vec![item("lunch", at(4, 12, 0), at(4, 13, 0))]);
        let slots = engine().find_slots_on_date(&state, date(4), 60);

        assert_eq!(slots.len(), 8);
        for slot in &slots {
            assert!(!(slot.start < at(4, 13, 0) && at(4, 12, 0) < slot.end));
        }
        let mut starts: Vec<_> = slots.iter().map(|s| s.start_time.hour()).collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![9, 10, 11, 13, 14, 15, 16, 17]);
    }

    #[test]
    fn test_next_free_slot_is_earliest() {
        let state = state_with(vec![item("a", at(4, 9, 0), at(4, 10, 30))]);
        let slot = engine()
            .find_next_free_slot(&state, 30, Some(at(4, 8, 0)))
            .expect("slot");
        assert_eq!(slot.start, at(4, 10, 30));
    }

    #[test]
    fn test_next_free_slot_skips_to_next_working_day() {
        // Friday 2030-03-08 fully booked; weekend off; Monday 11th is next.
        let state = state_with(vec![item("a", at(8, 9, 0), at(8, 18, 0))]);
        let slot = engine()
            .find_next_free_slot(&state, 60, Some(at(8, 7, 0)))
            .expect("slot");
        assert_eq!(slot.start, at(11, 9, 0));
    }

    #[test]
    fn test_not_before_rounds_up_to_minute() {
        let state = state_with(Vec::new());
        let after = at(4, 10, 0) + Duration::seconds(20);
        let slot = engine().find_next_free_slot(&state, 15, Some(after)).expect("slot");
        assert_eq!(slot.start, at(4, 10, 1));
    }

    #[test]
    fn test_past_slots_are_never_offered() {
        let state = state_with(Vec::new());
        let engine = SlotQueryEngine::default().with_now(at(4, 15, 0));
        let slots = engine.find_slots_on_date(&state, date(4), 60);
        assert!(slots.iter().all(|s| s.start >= at(4, 15, 0)));
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn test_buffer_keeps_distance() {
        let state = state_with(vec![item("a", at(4, 10, 0), at(4, 11, 0))]);
        let query = SlotQuery::new(30)
            .on(date(4))
            .with_mode(SlotSearchMode::AllDate)
            .with_buffer(15)
            .with_time_window(NaiveTime::from_hms_opt(9, 0, 0), NaiveTime::from_hms_opt(12, 0, 0))
            .with_max_results(50);
        let result = engine().find_available_slots(&state, &query);

        let mut starts: Vec<_> = result.slots.iter().map(|s| s.start).collect();
        starts.sort();
        // 09:00-09:30 fits before 09:45; after the item the gap opens at 11:15.
        assert_eq!(starts, vec![at(4, 9, 0), at(4, 11, 15)]);
    }

    #[test]
    fn test_blackout_and_override() {
        let mut state = state_with(Vec::new());
        state.blackouts.push(BlackoutWindow::new(at(4, 0, 0), at(4, 23, 0), "vacation"));
        state.availability = state
            .availability
            .clone()
            .with_override(DayAvailability::available(date(5), vec![TimeRange::hm(14, 0, 15, 0)]));

        let query = SlotQuery::new(60).between(date(4), date(5)).with_mode(SlotSearchMode::DateRange);
        let result = engine().find_available_slots(&state, &query);

        assert_eq!(result.slots.len(), 1);
        assert_eq!(result.slots[0].start, at(5, 14, 0));
        assert!(result.constraints_applied.iter().any(|c| c.contains("Blackout")));
        assert_eq!(result.search_range_days, 2);
    }

    #[test]
    fn test_capacity_filter() {
        let mut state = state_with(vec![item("long", at(4, 9, 0), at(4, 16, 0))]);
        state.capacity.constraints.max_hours_per_day = 7.5;

        assert!(engine().find_slots_on_date(&state, date(4), 60).is_empty());
        assert_eq!(engine().find_slots_on_date(&state, date(4), 30).len(), 4);

        let query = SlotQuery {
            respect_capacity: false,
            ..SlotQuery::new(60).on(date(4)).with_mode(SlotSearchMode::AllDate)
        };
        assert_eq!(engine().find_available_slots(&state, &query).slots.len(), 2);
    }

    #[test]
    fn test_ignored_item_does_not_block() {
        let state = state_with(vec![item("a", at(4, 9, 0), at(4, 18, 0))]);
        assert!(engine().find_slots_on_date(&state, date(4), 60).is_empty());

        let query = SlotQuery::new(60)
            .on(date(4))
            .with_mode(SlotSearchMode::AllDate)
            .ignoring_item("a");
        assert_eq!(engine().find_available_slots(&state, &query).slots.len(), 9);
    }

    #[test]
    fn test_midnight_crossing_range() {
        let availability = AvailabilityMap::new("u1", "UTC")
            .with_override(DayAvailability::available(date(4), vec![TimeRange::hm(22, 0, 2, 0)]));
        let state = WorldState::new("u1", availability, CapacityConstraints::default());

        let mut starts: Vec<_> = engine()
            .find_slots_on_date(&state, date(4), 60)
            .iter()
            .map(|s| s.start_time.hour())
            .collect();
        starts.sort_unstable();
        // Same-date segments: 00:00-02:00 and 22:00-24:00.
        assert_eq!(starts, vec![0, 1, 22, 23]);
    }

    #[test]
    fn test_analytical_hint_prefers_morning() {
        let state = state_with(Vec::new());
        let query = SlotQuery::new(60)
            .on(date(4))
            .with_mode(SlotSearchMode::BestFit)
            .with_category(TaskCategory::Analytical)
            .with_max_results(3);
        let result = engine().find_available_slots(&state, &query);
        assert_eq!(result.slots[0].start, at(4, 9, 0));
        assert!(result.slots.iter().all(|s| s.start_time.hour() <= 11));
    }

    #[test]
    fn test_preferred_time_wins() {
        let state = state_with(Vec::new());
        let query = SlotQuery::new(60)
            .on(date(4))
            .with_mode(SlotSearchMode::AllDate)
            .preferring_time(NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        let result = engine().find_available_slots(&state, &query);
        assert_eq!(result.slots[0].start, at(4, 15, 0));
    }

    #[test]
    fn test_can_fit_window() {
        let state = state_with(vec![item("a", at(4, 9, 0), at(4, 12, 0))]);
        let noon = NaiveTime::from_hms_opt(12, 0, 0);
        assert!(!engine().can_fit(&state, date(4), 60, None, noon));
        assert!(engine().can_fit(&state, date(4), 60, noon, None));
    }

    #[test]
    fn test_invalid_duration() {
        let state = state_with(Vec::new());
        let result = engine().find_available_slots(&state, &SlotQuery::new(0));
        assert!(result.slots.is_empty());
        assert_eq!(result.total_found, 0);
        assert!(result.constraints_applied[0].contains("Invalid duration"));
    }

    #[test]
    fn test_nearby_conflicts_annotated() {
        let state = state_with(vec![item("a", at(4, 12, 0), at(4, 13, 0))]);
        let slots = engine().find_slots_on_date(&state, date(4), 60);
        let adjacent = slots.iter().find(|s| s.start == at(4, 11, 0)).unwrap();
        let far = slots.iter().find(|s| s.start == at(4, 9, 0)).unwrap();
        assert_eq!(adjacent.conflicts_nearby, 1);
        assert_eq!(far.conflicts_nearby, 0);
        assert!((adjacent.capacity_load - 0.125).abs() < f64::EPSILON);
    }

    #[test]
    fn test_local_timezone_days() {
        let availability =
            AvailabilityMap::working_week("u1", "America/New_York", TimeRange::hm(9, 0, 17, 0), false);
        let state = WorldState::new("u1", availability, CapacityConstraints::default());
        let slots = engine().find_slots_on_date(&state, date(4), 60);

        // 09:00 EST is 14:00 UTC.
        let first = slots.iter().map(|s| s.start).min().unwrap();
        assert_eq!(first, at(4, 14, 0));
        assert_eq!(slots.len(), 8);
    }
}
