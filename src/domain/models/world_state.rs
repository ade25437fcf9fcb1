//! The complete in-memory schedule model for one user.
//!
//! WorldState is a pure data holder. Its fields are crate-private and it
//! exposes read accessors only; every write goes through
//! [`WorldUpdater`](crate::services::WorldUpdater). `Clone` is a full deep
//! copy of every nested collection and is what snapshot/rollback relies on.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::availability::{AvailabilityMap, BlackoutWindow, DayOfWeek, TimeRange};
use super::capacity::{local_date, CapacityConstraints, CapacityMap};
use super::scheduled_item::ScheduledItem;

/// Availability assumed for a weekday missing from the weekly pattern.
pub fn fallback_range() -> TimeRange {
    TimeRange::hm(9, 0, 18, 0)
}

/// Where a date's availability came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAvailability {
    /// No scheduling at all on this date.
    Blackout { reason: String },
    /// Scheduling allowed inside `ranges`.
    Ranges {
        ranges: Vec<TimeRange>,
        source: AvailabilitySource,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilitySource {
    DateOverride,
    WeeklyPattern,
    Fallback,
}

impl ResolvedAvailability {
    pub fn ranges(&self) -> &[TimeRange] {
        match self {
            Self::Blackout { .. } => &[],
            Self::Ranges { ranges, .. } => ranges,
        }
    }

    pub fn is_blackout(&self) -> bool {
        matches!(self, Self::Blackout { .. })
    }
}

/// Complete world model state for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub(crate) user_id: String,
    pub(crate) items: Vec<ScheduledItem>,
    pub(crate) availability: AvailabilityMap,
    pub(crate) capacity: CapacityMap,
    pub(crate) blackouts: Vec<BlackoutWindow>,
    /// Changes on every committed mutation; readers key caches on it.
    pub(crate) version: u64,
    pub(crate) last_updated: DateTime<Utc>,
}

impl WorldState {
    /// An empty world for `user_id`.
    pub fn new(
        user_id: impl Into<String>,
        availability: AvailabilityMap,
        constraints: CapacityConstraints,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            capacity: CapacityMap::new(user_id.clone(), constraints),
            user_id,
            items: Vec::new(),
            availability,
            blackouts: Vec::new(),
            version: 0,
            last_updated: Utc::now(),
        }
    }

    /// A world seeded with existing items; capacity tallies are derived
    /// from `items`, never taken on trust.
    pub fn from_parts(
        user_id: impl Into<String>,
        items: Vec<ScheduledItem>,
        availability: AvailabilityMap,
        constraints: CapacityConstraints,
        blackouts: Vec<BlackoutWindow>,
    ) -> Self {
        let mut state = Self::new(user_id, availability, constraints);
        let tz = state.timezone();
        state.capacity.recalculate_all(&items, tz);
        state.items = items;
        state.blackouts = blackouts;
        state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn items(&self) -> &[ScheduledItem] {
        &self.items
    }

    pub fn availability(&self) -> &AvailabilityMap {
        &self.availability
    }

    pub fn capacity(&self) -> &CapacityMap {
        &self.capacity
    }

    pub fn blackouts(&self) -> &[BlackoutWindow] {
        &self.blackouts
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn timezone(&self) -> Tz {
        self.availability.tz()
    }

    pub fn item(&self, id: &str) -> Option<&ScheduledItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.item(id).is_some()
    }

    /// Local calendar date of an instant in the user's timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        local_date(instant, self.timezone())
    }

    /// Items starting on `date` or spanning into it, sorted by start.
    pub fn items_on(&self, date: NaiveDate) -> Vec<&ScheduledItem> {
        let tz = self.timezone();
        let mut items: Vec<&ScheduledItem> = self
            .items
            .iter()
            .filter(|item| {
                let start = local_date(item.start, tz);
                let end = local_date(item.end, tz);
                start == date || (start < date && end >= date)
            })
            .collect();
        items.sort_by_key(|item| item.start);
        items
    }

    /// Number of items tallied under `date`.
    pub fn item_count_on(&self, date: NaiveDate) -> usize {
        let tz = self.timezone();
        self.items
            .iter()
            .filter(|item| local_date(item.start, tz) == date)
            .count()
    }

    /// Resolve the available ranges for a date.
    ///
    /// Order: blackout windows, then a date-specific override (a blackout
    /// override empties the day), then the weekly default, then 09:00-18:00.
    pub fn resolve_availability(&self, date: NaiveDate, respect_blackouts: bool) -> ResolvedAvailability {
        let tz = self.timezone();

        if respect_blackouts {
            if let Some(window) = self.blackouts.iter().find(|w| w.covers_date(date, tz)) {
                return ResolvedAvailability::Blackout {
                    reason: window.reason.clone(),
                };
            }
        }

        if let Some(day) = self.availability.override_for(date) {
            if day.is_blackout {
                return ResolvedAvailability::Blackout {
                    reason: day.notes.clone().unwrap_or_else(|| "blackout date".to_string()),
                };
            }
            return ResolvedAvailability::Ranges {
                ranges: day.ranges.clone(),
                source: AvailabilitySource::DateOverride,
            };
        }

        if let Some(ranges) = self.availability.weekly_ranges(DayOfWeek::of(date)) {
            return ResolvedAvailability::Ranges {
                ranges: ranges.to_vec(),
                source: AvailabilitySource::WeeklyPattern,
            };
        }

        ResolvedAvailability::Ranges {
            ranges: vec![fallback_range()],
            source: AvailabilitySource::Fallback,
        }
    }
}
