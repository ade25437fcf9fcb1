//! Capacity constraints and derived load tallies.
//!
//! The daily and weekly tallies are always derived from the item set.
//! They are recomputed from scratch for every affected period, never
//! patched incrementally.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::scheduled_item::ScheduledItem;

/// Per-user workload limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityConstraints {
    #[serde(default = "default_max_hours_per_day")]
    pub max_hours_per_day: f64,
    #[serde(default = "default_max_hours_per_week")]
    pub max_hours_per_week: f64,
    #[serde(default = "default_max_items_per_day")]
    pub max_items_per_day: u32,
    #[serde(default = "default_min_break_minutes")]
    pub min_break_minutes: u32,
    /// Longest run of back-to-back work before a break is required.
    #[serde(default = "default_max_consecutive_hours")]
    pub max_consecutive_hours: f64,
}

const fn default_max_hours_per_day() -> f64 {
    8.0
}

const fn default_max_hours_per_week() -> f64 {
    40.0
}

const fn default_max_items_per_day() -> u32 {
    10
}

const fn default_min_break_minutes() -> u32 {
    15
}

const fn default_max_consecutive_hours() -> f64 {
    4.0
}

impl Default for CapacityConstraints {
    fn default() -> Self {
        Self {
            max_hours_per_day: default_max_hours_per_day(),
            max_hours_per_week: default_max_hours_per_week(),
            max_items_per_day: default_max_items_per_day(),
            min_break_minutes: default_min_break_minutes(),
            max_consecutive_hours: default_max_consecutive_hours(),
        }
    }
}

impl CapacityConstraints {
    /// The conservative profile new users start with.
    pub fn conservative() -> Self {
        Self {
            max_hours_per_day: 6.0,
            max_hours_per_week: 30.0,
            max_items_per_day: 8,
            min_break_minutes: 15,
            max_consecutive_hours: 3.0,
        }
    }
}

/// Granularity of a capacity tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Daily,
    Weekly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }
}

/// Tally key for a calendar date: `2030-03-04`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Tally key for the ISO week containing `date`: `2030-W10`.
pub fn week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// Local calendar date an item is tallied under.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Capacity limits plus the current derived load per date and ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityMap {
    pub user_id: String,
    pub constraints: CapacityConstraints,
    /// Hours scheduled per date key.
    #[serde(default)]
    pub daily_load: BTreeMap<String, f64>,
    /// Hours scheduled per ISO week key.
    #[serde(default)]
    pub weekly_load: BTreeMap<String, f64>,
}

impl CapacityMap {
    pub fn new(user_id: impl Into<String>, constraints: CapacityConstraints) -> Self {
        Self {
            user_id: user_id.into(),
            constraints,
            daily_load: BTreeMap::new(),
            weekly_load: BTreeMap::new(),
        }
    }

    pub fn daily_hours(&self, date: NaiveDate) -> f64 {
        self.daily_load.get(&date_key(date)).copied().unwrap_or(0.0)
    }

    pub fn weekly_hours(&self, date: NaiveDate) -> f64 {
        self.weekly_load.get(&week_key(date)).copied().unwrap_or(0.0)
    }

    /// How loaded a day is, 0.0 (empty) to 1.0 (at or over the limit).
    pub fn day_load_ratio(&self, date: NaiveDate) -> f64 {
        let limit = self.constraints.max_hours_per_day;
        if limit > 0.0 {
            (self.daily_hours(date) / limit).min(1.0)
        } else {
            0.0
        }
    }

    /// Recompute the tallies for `dates` (and the ISO weeks containing
    /// them) from the full item set. Periods left without items are
    /// dropped so an emptied day is indistinguishable from one never used.
    ///
    /// Returns the recomputed values keyed by period.
    pub(crate) fn recalculate(
        &mut self,
        items: &[ScheduledItem],
        dates: &BTreeSet<NaiveDate>,
        tz: Tz,
    ) -> CapacityChanges {
        let mut changes = CapacityChanges::default();

        for &date in dates {
            let key = date_key(date);
            let hours = sum_hours(items, tz, |d| d == date);
            store(&mut self.daily_load, &key, hours);
            changes.daily.insert(key, hours);
        }

        let weeks: BTreeSet<String> = dates.iter().map(|&d| week_key(d)).collect();
        for key in weeks {
            let hours = sum_hours(items, tz, |d| week_key(d) == key);
            store(&mut self.weekly_load, &key, hours);
            changes.weekly.insert(key, hours);
        }

        changes
    }

    /// Rebuild every tally from scratch.
    pub(crate) fn recalculate_all(&mut self, items: &[ScheduledItem], tz: Tz) {
        self.daily_load.clear();
        self.weekly_load.clear();
        for item in items {
            let date = local_date(item.start, tz);
            *self.daily_load.entry(date_key(date)).or_insert(0.0) += item.estimated_hours();
            *self.weekly_load.entry(week_key(date)).or_insert(0.0) += item.estimated_hours();
        }
    }
}

fn sum_hours(items: &[ScheduledItem], tz: Tz, matches: impl Fn(NaiveDate) -> bool) -> f64 {
    items
        .iter()
        .filter(|item| matches(local_date(item.start, tz)))
        .map(ScheduledItem::estimated_hours)
        .sum()
}

fn store(tally: &mut BTreeMap<String, f64>, key: &str, hours: f64) {
    if hours > 0.0 {
        tally.insert(key.to_string(), hours);
    } else {
        tally.remove(key);
    }
}

/// Recomputed tallies produced by one mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityChanges {
    pub daily: BTreeMap<String, f64>,
    pub weekly: BTreeMap<String, f64>,
}

impl CapacityChanges {
    pub fn is_empty(&self) -> bool {
        self.daily.is_empty() && self.weekly.is_empty()
    }

    /// One snapshot per changed period, for analytics persistence.
    pub fn snapshots(&self, user_id: &str, constraints: &CapacityConstraints) -> Vec<CapacitySnapshot> {
        let daily = self.daily.iter().map(|(key, &hours)| {
            CapacitySnapshot::new(user_id, PeriodType::Daily, key, constraints.max_hours_per_day, hours)
        });
        let weekly = self.weekly.iter().map(|(key, &hours)| {
            CapacitySnapshot::new(user_id, PeriodType::Weekly, key, constraints.max_hours_per_week, hours)
        });
        daily.chain(weekly).collect()
    }
}

/// A point-in-time record of one period's load against its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub user_id: String,
    pub period_type: PeriodType,
    pub period_key: String,
    pub limit_hours: f64,
    pub scheduled_hours: f64,
    pub utilization_rate: f64,
    pub recorded_at: DateTime<Utc>,
}

impl CapacitySnapshot {
    pub fn new(
        user_id: &str,
        period_type: PeriodType,
        period_key: &str,
        limit_hours: f64,
        scheduled_hours: f64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            period_type,
            period_key: period_key.to_string(),
            limit_hours,
            scheduled_hours,
            utilization_rate: if limit_hours > 0.0 {
                scheduled_hours / limit_hours
            } else {
                0.0
            },
            recorded_at: Utc::now(),
        }
    }
}
