//! Events handed to the learning hook after a successful mutation.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::availability::DayOfWeek;
use super::scheduled_item::ScheduledItem;
use super::update::UpdateAction;

/// Scheduling pattern observation for one item or one applied plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LearningEvent {
    Item {
        user_id: String,
        action: UpdateAction,
        item_id: String,
        plan_id: String,
        title: String,
        duration_minutes: i64,
        scheduled_at: DateTime<Utc>,
        /// Local weekday and wall-clock start.
        day_of_week: DayOfWeek,
        time_of_day: NaiveTime,
    },
    Plan {
        user_id: String,
        item_ids: Vec<String>,
        /// Local start date of each item, in batch order.
        planned_dates: Vec<NaiveDate>,
        /// Hours from the earliest start to the latest end.
        time_span_hours: f64,
    },
}

impl LearningEvent {
    pub fn for_item(action: UpdateAction, item: &ScheduledItem, tz: Tz) -> Self {
        let local = item.start.with_timezone(&tz);
        Self::Item {
            user_id: item.user_id.clone(),
            action,
            item_id: item.id.clone(),
            plan_id: item.plan_id.clone(),
            title: item.title.clone(),
            duration_minutes: item.span().num_minutes(),
            scheduled_at: item.start,
            day_of_week: DayOfWeek::of(local.date_naive()),
            time_of_day: local.time(),
        }
    }

    pub fn for_plan(user_id: &str, items: &[ScheduledItem], tz: Tz) -> Self {
        Self::Plan {
            user_id: user_id.to_string(),
            item_ids: items.iter().map(|i| i.id.clone()).collect(),
            planned_dates: items
                .iter()
                .map(|i| i.start.with_timezone(&tz).date_naive())
                .collect(),
            time_span_hours: plan_timespan_hours(items),
        }
    }

    pub fn plan_size(&self) -> usize {
        match self {
            Self::Item { .. } => 1,
            Self::Plan { item_ids, .. } => item_ids.len(),
        }
    }
}

fn plan_timespan_hours(items: &[ScheduledItem]) -> f64 {
    let earliest = items.iter().map(|i| i.start).min();
    let latest = items.iter().map(|i| i.end).max();
    match (earliest, latest) {
        (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 3600.0,
        _ => 0.0,
    }
}
