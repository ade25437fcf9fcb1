//! Slot search domain model: queries, candidate slots and results.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::availability::DayOfWeek;

/// How a slot search walks the date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlotSearchMode {
    /// Stop at the first day with any candidate; earliest start wins.
    #[default]
    NextAvailable,
    AllToday,
    AllDate,
    DateRange,
    /// Rank the whole range by preference.
    BestFit,
}

impl SlotSearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextAvailable => "next_available",
            Self::AllToday => "all_today",
            Self::AllDate => "all_date",
            Self::DateRange => "date_range",
            Self::BestFit => "best_fit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl PartOfDay {
    /// Morning before 12:00, afternoon 12:00-17:00, evening from 17:00.
    pub fn of_hour(hour: u32) -> Self {
        match hour {
            0..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            _ => Self::Evening,
        }
    }
}

/// Semantic category of the work a slot is wanted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Creative,
    Analytical,
    Administrative,
    Physical,
    Social,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusLevel {
    Deep,
    Moderate,
    Light,
}

/// A concrete open interval, with derived quality indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Local calendar date.
    pub date: NaiveDate,
    /// Local wall-clock start/end.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub day_of_week: DayOfWeek,
    pub is_morning: bool,
    pub is_afternoon: bool,
    pub is_evening: bool,

    /// Items within the nearby-conflict window of this slot.
    pub conflicts_nearby: u32,
    /// Day load ratio, 0.0 (empty) to 1.0 (at capacity).
    pub capacity_load: f64,

    pub energy_score: f64,
    pub focus_score: f64,
    pub creativity_score: f64,
}

impl TimeSlot {
    /// Build a slot for `start..end`, deriving local fields in `tz`.
    pub fn from_range(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> Self {
        let local_start = start.with_timezone(&tz);
        let local_end = end.with_timezone(&tz);
        let hour = local_start.hour();
        let part = PartOfDay::of_hour(hour);
        let minutes = (end - start).num_minutes().max(0);

        Self {
            start,
            end,
            duration_minutes: u32::try_from(minutes).unwrap_or(u32::MAX),
            date: local_start.date_naive(),
            start_time: local_start.time(),
            end_time: local_end.time(),
            day_of_week: DayOfWeek::of(local_start.date_naive()),
            is_morning: part == PartOfDay::Morning,
            is_afternoon: part == PartOfDay::Afternoon,
            is_evening: part == PartOfDay::Evening,
            conflicts_nearby: 0,
            capacity_load: 0.0,
            energy_score: energy_score(hour),
            focus_score: focus_score(hour),
            creativity_score: creativity_score(hour),
        }
    }

    pub fn part_of_day(&self) -> PartOfDay {
        PartOfDay::of_hour(self.start_time.hour())
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} {}-{}",
            self.day_of_week,
            self.date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

// Fixed heuristic bands keyed on the local start hour. Bands are checked
// top to bottom, so earlier bands win on shared boundary hours.

pub fn energy_score(hour: u32) -> f64 {
    match hour {
        9..=11 => 1.0,
        14..=16 => 0.85,
        8 | 12 | 13 => 0.7,
        17 | 18 => 0.6,
        _ => 0.3,
    }
}

pub fn focus_score(hour: u32) -> f64 {
    match hour {
        9..=11 => 1.0,
        8 => 0.8,
        15..=17 => 0.75,
        7 | 12 | 13 => 0.6,
        _ => 0.4,
    }
}

pub fn creativity_score(hour: u32) -> f64 {
    match hour {
        10..=12 => 1.0,
        19..=21 => 0.9,
        8 | 9 | 14 | 15 | 16 => 0.7,
        17 | 18 => 0.6,
        _ => 0.4,
    }
}

/// Parameters for a slot search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotQuery {
    pub duration_minutes: u32,
    /// First local date searched; defaults to today.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last local date searched (inclusive); defaults to start + search window.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub earliest_time: Option<NaiveTime>,
    #[serde(default)]
    pub latest_time: Option<NaiveTime>,
    /// No slot may start before this instant.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferred_times: Vec<NaiveTime>,
    #[serde(default)]
    pub preferred_parts_of_day: Vec<PartOfDay>,
    #[serde(default)]
    pub exclude_weekends: bool,
    #[serde(default)]
    pub mode: SlotSearchMode,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Gap to keep from existing items on both sides.
    #[serde(default)]
    pub buffer_minutes: u32,
    #[serde(default = "default_true")]
    pub respect_capacity: bool,
    #[serde(default = "default_true")]
    pub respect_blackouts: bool,
    /// Treat this item as absent (used when rescheduling it).
    #[serde(default)]
    pub ignore_item_id: Option<String>,

    // -- Semantic hints --
    #[serde(default)]
    pub task_category: Option<TaskCategory>,
    #[serde(default)]
    pub energy_level: Option<EnergyLevel>,
    #[serde(default)]
    pub focus_level: Option<FocusLevel>,
}

const fn default_max_results() -> usize {
    10
}

const fn default_true() -> bool {
    true
}

impl SlotQuery {
    pub fn new(duration_minutes: u32) -> Self {
        Self {
            duration_minutes,
            start_date: None,
            end_date: None,
            earliest_time: None,
            latest_time: None,
            not_before: None,
            preferred_times: Vec::new(),
            preferred_parts_of_day: Vec::new(),
            exclude_weekends: false,
            mode: SlotSearchMode::NextAvailable,
            max_results: default_max_results(),
            buffer_minutes: 0,
            respect_capacity: true,
            respect_blackouts: true,
            ignore_item_id: None,
            task_category: None,
            energy_level: None,
            focus_level: None,
        }
    }

    // Builder methods
    pub fn between(mut self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self.end_date = Some(end_date);
        self
    }

    pub fn on(self, date: NaiveDate) -> Self {
        self.between(date, date)
    }

    pub fn with_mode(mut self, mode: SlotSearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_time_window(mut self, earliest: Option<NaiveTime>, latest: Option<NaiveTime>) -> Self {
        self.earliest_time = earliest;
        self.latest_time = latest;
        self
    }

    pub fn not_before(mut self, instant: DateTime<Utc>) -> Self {
        self.not_before = Some(instant);
        self
    }

    pub fn with_buffer(mut self, minutes: u32) -> Self {
        self.buffer_minutes = minutes;
        self
    }

    pub fn excluding_weekends(mut self) -> Self {
        self.exclude_weekends = true;
        self
    }

    pub fn ignoring_item(mut self, item_id: impl Into<String>) -> Self {
        self.ignore_item_id = Some(item_id.into());
        self
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.task_category = Some(category);
        self
    }

    pub fn with_energy(mut self, level: EnergyLevel) -> Self {
        self.energy_level = Some(level);
        self
    }

    pub fn with_focus(mut self, level: FocusLevel) -> Self {
        self.focus_level = Some(level);
        self
    }

    pub fn preferring_time(mut self, time: NaiveTime) -> Self {
        self.preferred_times.push(time);
        self
    }

    pub fn preferring_part(mut self, part: PartOfDay) -> Self {
        self.preferred_parts_of_day.push(part);
        self
    }

    pub fn has_semantic_hints(&self) -> bool {
        self.task_category.is_some() || self.energy_level.is_some() || self.focus_level.is_some()
    }
}

/// Ranked outcome of a slot search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotQueryResult {
    pub slots: Vec<TimeSlot>,
    pub total_found: usize,
    pub search_range_days: i64,
    /// Human-readable notes on filters that removed candidates.
    pub constraints_applied: Vec<String>,
    pub search_time_us: u128,
    /// WorldState version the search observed.
    pub world_state_version: u64,
}

impl SlotQueryResult {
    pub fn empty(version: u64, note: impl Into<String>) -> Self {
        Self {
            slots: Vec::new(),
            total_found: 0,
            search_range_days: 0,
            constraints_applied: vec![note.into()],
            search_time_us: 0,
            world_state_version: version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_score_bands() {
        assert!((focus_score(9) - 1.0).abs() < f64::EPSILON);
        assert!((focus_score(8) - 0.8).abs() < f64::EPSILON);
        assert!((focus_score(22) - 0.4).abs() < f64::EPSILON);
        assert!((energy_score(15) - 0.85).abs() < f64::EPSILON);
        assert!((energy_score(3) - 0.3).abs() < f64::EPSILON);
        assert!((creativity_score(11) - 1.0).abs() < f64::EPSILON);
        assert!((creativity_score(20) - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_slot_local_fields() {
        let start = Utc.with_ymd_and_hms(2030, 3, 4, 13, 0, 0).unwrap();
        let end = start + chrono::Duration::minutes(45);
        let slot = TimeSlot::from_range(start, end, Tz::Europe__Berlin);

        // 13:00 UTC is 14:00 in Berlin in March (CET).
        assert_eq!(slot.start_time, NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert_eq!(slot.duration_minutes, 45);
        assert!(slot.is_afternoon);
        assert!(!slot.is_morning);
        assert_eq!(slot.day_of_week, DayOfWeek::Monday);
        assert!((slot.energy_score - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_part_of_day_bounds() {
        assert_eq!(PartOfDay::of_hour(11), PartOfDay::Morning);
        assert_eq!(PartOfDay::of_hour(12), PartOfDay::Afternoon);
        assert_eq!(PartOfDay::of_hour(17), PartOfDay::Evening);
    }

    #[test]
    fn test_query_builder() {
        let date = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
        let query = SlotQuery::new(30)
            .on(date)
            .with_mode(SlotSearchMode::AllDate)
            .with_category(TaskCategory::Analytical);
        assert_eq!(query.start_date, Some(date));
        assert_eq!(query.end_date, Some(date));
        assert!(query.has_semantic_hints());
        assert!(query.respect_capacity);
    }
}
