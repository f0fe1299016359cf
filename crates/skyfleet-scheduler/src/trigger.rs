//! Conversion from a mission's timing intent to a trigger specification.
//!
//! Periodic triggers use the five calendar fields of a cron expression
//! (minute, hour, day of month, month, day of week) but are kept as a
//! structured value. They are evaluated in UTC.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use skyfleet_core::{Frequency, Mission, MissionType, RecurrenceRule};
use std::fmt;

use crate::error::SchedulerError;

/// How far ahead a periodic pattern is searched before giving up.
const MAX_SEARCH_DAYS: u32 = 5 * 366;

/// One calendar field of a periodic pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CalendarField {
    /// `*`
    Any,
    /// A single value.
    At(u32),
    /// `*/n`, counted from the field's first value.
    Every(u32),
}

impl CalendarField {
    fn matches(self, value: u32, first: u32) -> bool {
        match self {
            Self::Any => true,
            Self::At(expected) => expected == value,
            Self::Every(step) => step > 0 && (value - first) % step == 0,
        }
    }
}

impl fmt::Display for CalendarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::At(value) => write!(f, "{value}"),
            Self::Every(step) => write!(f, "*/{step}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarPattern {
    pub minute: u32,
    pub hour: u32,
    pub day_of_month: CalendarField,
    pub month: CalendarField,
    /// 0-6 with 0 = Sunday; 7 is also accepted as Sunday.
    pub day_of_week: CalendarField,
}

impl CalendarPattern {
    /// Every day at 00:00.
    #[must_use]
    pub fn midnight() -> Self {
        Self {
            minute: 0,
            hour: 0,
            day_of_month: CalendarField::Any,
            month: CalendarField::Any,
            day_of_week: CalendarField::Any,
        }
    }

    #[must_use]
    pub fn matches_date(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_sunday();
        let day_of_week = match self.day_of_week {
            CalendarField::At(7) => weekday == 0,
            field => field.matches(weekday, 0),
        };
        day_of_week && self.day_of_month.matches(date.day(), 1) && self.month.matches(date.month(), 1)
    }

    /// First matching minute strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut date = after.date_naive();
        for _ in 0..MAX_SEARCH_DAYS {
            if self.matches_date(date) {
                let candidate = date.and_hms_opt(self.hour, self.minute, 0)?.and_utc();
                if candidate > after {
                    return Some(candidate);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

impl fmt::Display for CalendarPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

/// When a job should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fires once at a minute-aligned instant.
    OneShot { at: DateTime<Utc> },
    /// Fires every time the calendar pattern matches.
    Periodic { pattern: CalendarPattern },
}

impl TriggerSpec {
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::OneShot { .. })
    }

    #[must_use]
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OneShot { at } => (*at > after).then_some(*at),
            Self::Periodic { pattern } => pattern.next_after(after),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneShot { at } => write!(f, "once at {}", at.to_rfc3339()),
            Self::Periodic { pattern } => write!(f, "{pattern}"),
        }
    }
}

/// One-shot trigger at `time`, truncated to the minute.
#[must_use]
pub fn convert_absolute(time: DateTime<Utc>) -> TriggerSpec {
    let at = time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time);
    TriggerSpec::OneShot { at }
}

/// Periodic trigger for a recurrence rule.
///
/// For `weekly` and `monthly` the interval selects the weekday or the day of
/// month to fire on; it is not a repeat count.
pub fn convert_recurrence(rule: &RecurrenceRule) -> Result<TriggerSpec, SchedulerError> {
    let frequency = Frequency::parse(&rule.frequency)
        .ok_or_else(|| SchedulerError::InvalidRecurrenceFrequency(rule.frequency.clone()))?;
    let interval = rule.interval;
    let out_of_range =
        || SchedulerError::InvalidRecurrenceInterval { frequency: frequency.as_str(), interval };

    let base = CalendarPattern::midnight();
    let pattern = match frequency {
        Frequency::Daily => {
            if interval == 0 {
                return Err(out_of_range());
            }
            CalendarPattern { day_of_month: CalendarField::Every(interval), ..base }
        }
        Frequency::Weekly => {
            if interval > 7 {
                return Err(out_of_range());
            }
            CalendarPattern { day_of_week: CalendarField::At(interval), ..base }
        }
        Frequency::Monthly => {
            if !(1..=31).contains(&interval) {
                return Err(out_of_range());
            }
            CalendarPattern { day_of_month: CalendarField::At(interval), ..base }
        }
    };
    Ok(TriggerSpec::Periodic { pattern })
}

pub fn for_mission(mission: &Mission) -> Result<TriggerSpec, SchedulerError> {
    match mission.mission_type {
        MissionType::OneTime => Ok(convert_absolute(mission.scheduled_time)),
        MissionType::Recurring => {
            let rule = mission
                .recurrence_rule
                .as_ref()
                .ok_or(SchedulerError::MissingRecurrenceRule(mission.id))?;
            convert_recurrence(rule)
        }
    }
}
