//! Calendar projection of recurring templates onto concrete dates
//!
//! Everything here is pure: callers pass templates and the current instant,
//! and get resolved occurrences back.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{ClassId, ClassTemplate, DateKey, InstructorId, Roster, TimeOfDay, UserId};

/// When students may start booking an occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    /// Calendar days before the occurrence date
    pub days_before: u32,
    /// Local time of day the window opens on that day
    pub opens_at: TimeOfDay,
}

impl Default for BookingWindow {
    fn default() -> Self {
        Self {
            days_before: 2,
            opens_at: TimeOfDay::hm(9, 0),
        }
    }
}

impl BookingWindow {
    /// Instant at which students may book occurrences on `date`
    pub fn opens_for(&self, date: DateKey) -> NaiveDateTime {
        date.sub_days(self.days_before as u64).at(self.opens_at)
    }

    pub fn is_too_early(&self, now: NaiveDateTime, date: DateKey) -> bool {
        now < self.opens_for(date)
    }
}

/// A template resolved for one concrete date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub template_id: ClassId,
    pub title: String,
    pub location: String,
    pub date: DateKey,
    pub start_time: TimeOfDay,
    pub duration_minutes: u32,
    pub effective_instructor_id: InstructorId,
    pub base_instructor_id: InstructorId,
    pub is_substitute: bool,
    pub roster: Roster,
    pub capacity: u32,
    pub points_cost: Decimal,
}

impl Occurrence {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.at(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn spots_left(&self) -> u32 {
        self.capacity.saturating_sub(self.roster.len() as u32)
    }

    /// Roster entries that no longer resolve to a known user
    pub fn ghost_ids(&self, known: &HashSet<UserId>) -> Vec<UserId> {
        self.roster
            .iter()
            .filter(|id| !known.contains(*id))
            .cloned()
            .collect()
    }

    pub fn ghost_count(&self, known: &HashSet<UserId>) -> usize {
        self.roster.iter().filter(|id| !known.contains(*id)).count()
    }
}

/// Resolve `template` for `date`: substitute instructor if any, roster if any
pub fn project(template: &ClassTemplate, date: DateKey) -> Occurrence {
    let (effective_instructor_id, is_substitute) = match template.substitutions.get(&date) {
        Some(sub) => (sub.clone(), true),
        None => (template.instructor_id.clone(), false),
    };

    Occurrence {
        template_id: template.id,
        title: template.title.clone(),
        location: template.location.clone(),
        date,
        start_time: template.start_time,
        duration_minutes: template.duration_minutes,
        effective_instructor_id,
        base_instructor_id: template.instructor_id.clone(),
        is_substitute,
        roster: template.bookings.get(&date).cloned().unwrap_or_default(),
        capacity: template.capacity,
        points_cost: template.points_cost,
    }
}

/// Earliest date on or after today that falls on `day` and has not started
///
/// An occurrence counts as started once `now` reaches its start time.
pub fn next_occurrence_date(day: Weekday, start: TimeOfDay, now: NaiveDateTime) -> DateKey {
    let today = DateKey::new(now.date());
    let ahead = (day.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let candidate = today.add_days(ahead as u64);
    if ahead == 0 && now >= candidate.at(start) {
        candidate.add_days(7)
    } else {
        candidate
    }
}

/// Templates that ran on `date`, one per start time
///
/// Forking leaves several versions of the same weekly slot behind; the most
/// recently created version still effective on `date` wins.
pub fn reconstruct_day(templates: &[ClassTemplate], date: DateKey) -> Vec<&ClassTemplate> {
    let weekday = date.weekday();
    let mut slots: BTreeMap<TimeOfDay, &ClassTemplate> = BTreeMap::new();

    for template in templates
        .iter()
        .filter(|t| t.day_of_week == weekday && t.is_effective_on(date))
    {
        slots
            .entry(template.start_time)
            .and_modify(|current| {
                if (template.created_at, template.id) > (current.created_at, current.id) {
                    *current = template;
                }
            })
            .or_insert(template);
    }

    slots.into_values().collect()
}

/// Live board: every active template on its next occurrence
pub fn upcoming_board(templates: &[ClassTemplate], now: NaiveDateTime) -> Vec<Occurrence> {
    let mut board: Vec<Occurrence> = templates
        .iter()
        .filter(|t| t.is_active())
        .map(|t| project(t, next_occurrence_date(t.day_of_week, t.start_time, now)))
        .collect();

    board.sort_by(|a, b| {
        (a.date, a.start_time, a.template_id).cmp(&(b.date, b.start_time, b.template_id))
    });
    board
}

/// Occurrences on or after `from` whose roster holds `student`
pub fn student_schedule(
    templates: &[ClassTemplate],
    student: &UserId,
    from: DateKey,
) -> Vec<Occurrence> {
    let mut schedule: Vec<Occurrence> = templates
        .iter()
        .flat_map(|t| {
            t.bookings
                .range(from..)
                .filter(|(_, roster)| roster.contains(student))
                .map(move |(date, _)| project(t, *date))
        })
        .collect();

    schedule.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
    schedule
}
