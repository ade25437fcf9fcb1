//! Availability domain model: recurring weekly windows, per-date
//! overrides and blackout windows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Minutes in a calendar day; the exclusive upper bound of a day's clock.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Day of week used as the key of the default weekly pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    pub fn of(date: NaiveDate) -> Self {
        Self::from(date.weekday())
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Self::Saturday | Self::Sunday)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A start-of-day / end-of-day pair with no date attached.
///
/// A range whose end is not after its start crosses midnight and is
/// treated as two sub-ranges split at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Convenience constructor from whole hours and minutes.
    ///
    /// Out-of-range values clamp to midnight.
    pub fn hm(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(start_hour, start_minute, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(end_hour, end_minute, 0).unwrap_or_default(),
        }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Minute-of-day intervals `[start, end)` covered on a single date.
    pub fn day_segments(&self) -> Vec<(u32, u32)> {
        let start = minute_of_day(self.start);
        let end = minute_of_day(self.end);
        let segments = if self.crosses_midnight() {
            vec![(start, MINUTES_PER_DAY), (0, end)]
        } else {
            vec![(start, end)]
        };
        segments.into_iter().filter(|(s, e)| e > s).collect()
    }

    /// Whether a local `[start, end]` minute span fits inside one segment.
    pub fn contains_span(&self, start_minute: u32, end_minute: u32) -> bool {
        self.day_segments()
            .iter()
            .any(|&(s, e)| start_minute >= s && end_minute <= e)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Availability for one specific calendar date, overriding the weekly default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    #[serde(default)]
    pub ranges: Vec<TimeRange>,
    /// Overrides every range to "unavailable".
    #[serde(default)]
    pub is_blackout: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DayAvailability {
    pub fn available(date: NaiveDate, ranges: Vec<TimeRange>) -> Self {
        Self {
            date,
            ranges,
            is_blackout: false,
            notes: None,
        }
    }

    pub fn blackout(date: NaiveDate, notes: impl Into<String>) -> Self {
        Self {
            date,
            ranges: Vec::new(),
            is_blackout: true,
            notes: Some(notes.into()),
        }
    }

    /// Total available minutes on the date.
    pub fn total_available_minutes(&self) -> u32 {
        if self.is_blackout {
            return 0;
        }
        self.ranges
            .iter()
            .flat_map(TimeRange::day_segments)
            .map(|(s, e)| e - s)
            .sum()
    }
}

/// A user's availability: weekly pattern plus date-specific overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityMap {
    pub user_id: String,
    #[serde(default)]
    pub weekly_pattern: BTreeMap<DayOfWeek, Vec<TimeRange>>,
    #[serde(default)]
    pub date_overrides: Vec<DayAvailability>,
    /// IANA timezone name, e.g. `Europe/Berlin`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl AvailabilityMap {
    /// An empty map: no weekly pattern, no overrides.
    pub fn new(user_id: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            weekly_pattern: BTreeMap::new(),
            date_overrides: Vec::new(),
            timezone: timezone.into(),
        }
    }

    /// The standard working pattern: `range` on weekdays, weekends off
    /// unless `include_weekends` is set.
    pub fn working_week(
        user_id: impl Into<String>,
        timezone: impl Into<String>,
        range: TimeRange,
        include_weekends: bool,
    ) -> Self {
        let weekly_pattern = DayOfWeek::ALL
            .iter()
            .map(|&day| {
                let ranges = if day.is_weekend() && !include_weekends {
                    Vec::new()
                } else {
                    vec![range]
                };
                (day, ranges)
            })
            .collect();

        Self {
            user_id: user_id.into(),
            weekly_pattern,
            date_overrides: Vec::new(),
            timezone: timezone.into(),
        }
    }

    pub fn with_day(mut self, day: DayOfWeek, ranges: Vec<TimeRange>) -> Self {
        self.weekly_pattern.insert(day, ranges);
        self
    }

    pub fn with_override(mut self, day: DayAvailability) -> Self {
        self.date_overrides.retain(|d| d.date != day.date);
        self.date_overrides.push(day);
        self
    }

    /// Resolved timezone; unknown names fall back to UTC.
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "unknown timezone, falling back to UTC");
            Tz::UTC
        })
    }

    pub fn override_for(&self, date: NaiveDate) -> Option<&DayAvailability> {
        self.date_overrides.iter().find(|d| d.date == date)
    }

    pub fn weekly_ranges(&self, day: DayOfWeek) -> Option<&[TimeRange]> {
        self.weekly_pattern.get(&day).map(Vec::as_slice)
    }
}

/// A period during which nothing may be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// e.g. "vacation", "meeting", "personal".
    pub reason: String,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub recurrence_pattern: Option<String>,
}

impl BlackoutWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            start,
            end,
            reason: reason.into(),
            recurring: false,
            recurrence_pattern: None,
        }
    }

    /// Whether the window overlaps any part of the local calendar date.
    pub fn covers_date(&self, date: NaiveDate, tz: Tz) -> bool {
        let day_start = local_to_utc(tz, date, NaiveTime::default());
        let next_day = date.succ_opt().map(|d| local_to_utc(tz, d, NaiveTime::default()));
        match (day_start, next_day) {
            (Some(start), Some(Some(end))) => self.start < end && start < self.end,
            _ => false,
        }
    }
}

/// Minute of day for a clock time (seconds are dropped).
pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Convert a local wall-clock time on `date` into UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant;
/// nonexistent times (DST spring-forward) resolve to the first valid
/// instant after the gap.
pub fn local_to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a local minute-of-day (0..=1440) on `date` into UTC.
pub fn local_minute_to_utc(tz: Tz, date: NaiveDate, minute: u32) -> Option<DateTime<Utc>> {
    if minute >= MINUTES_PER_DAY {
        return local_to_utc(tz, date.succ_opt()?, NaiveTime::default());
    }
    let time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)?;
    local_to_utc(tz, date, time)
}
