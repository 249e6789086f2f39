//! Overlap detection for instructors and students
//!
//! Intervals are half-open minute ranges within one day, so a class ending at
//! 11:00 does not clash with one starting at 11:00.

use chrono::Weekday;
use serde::Serialize;

use crate::models::{ClassId, ClassTemplate, DateKey, InstructorId, TimeOfDay, UserId};

/// The class a proposed slot collides with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clash {
    pub title: String,
    pub start_time: TimeOfDay,
}

impl Clash {
    fn of(template: &ClassTemplate) -> Self {
        Self {
            title: template.title.clone(),
            start_time: template.start_time,
        }
    }
}

/// Whether `[a_start, a_end)` and `[b_start, b_end)` share any minute
pub fn intervals_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

fn slot(start: TimeOfDay, duration_minutes: u32) -> (u32, u32) {
    let start = start.minutes_since_midnight();
    (start, start + duration_minutes)
}

/// First active class that would put `instructor` in two places at once
///
/// Without `specific_date` every template is judged by its base instructor.
/// With a date, that date's substitution replaces the base instructor.
pub fn check_conflict(
    templates: &[ClassTemplate],
    instructor: &InstructorId,
    day: Weekday,
    start: TimeOfDay,
    duration_minutes: u32,
    exclude: Option<ClassId>,
    specific_date: Option<DateKey>,
) -> Option<Clash> {
    let proposed = slot(start, duration_minutes);

    templates
        .iter()
        .filter(|t| t.is_active() && t.day_of_week == day && Some(t.id) != exclude)
        .filter(|t| {
            let effective = match specific_date {
                Some(date) => t.instructor_on(date),
                None => &t.instructor_id,
            };
            effective == instructor
        })
        .find(|t| intervals_overlap(proposed, t.interval()))
        .map(Clash::of)
}

/// Another class on `date` the student is booked into that overlaps `target`
pub fn find_student_clash(
    templates: &[ClassTemplate],
    student: &UserId,
    date: DateKey,
    target: &ClassTemplate,
) -> Option<Clash> {
    let weekday = date.weekday();

    templates
        .iter()
        .filter(|t| t.id != target.id && t.day_of_week == weekday)
        .filter(|t| t.roster_on(date).is_some_and(|roster| roster.contains(student)))
        .find(|t| intervals_overlap(target.interval(), t.interval()))
        .map(Clash::of)
}
