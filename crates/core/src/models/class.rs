//! Recurring class template model

use std::collections::BTreeMap;
use std::fmt;

use chrono::Weekday;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::calendar::{DateKey, TimeOfDay};
use super::instructor::InstructorId;
use super::user::UserId;
use crate::error::{Error, Result};

/// Sequential class template identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

/// Students enrolled on one date, in booking order, without duplicates
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Roster(Vec<UserId>);

impl Roster {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a student; returns false if already enrolled
    pub fn insert(&mut self, student: UserId) -> bool {
        if self.contains(&student) {
            return false;
        }
        self.0.push(student);
        true
    }

    pub fn contains(&self, student: &UserId) -> bool {
        self.0.iter().any(|s| s == student)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[UserId] {
        &self.0
    }
}

impl FromIterator<UserId> for Roster {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for id in iter {
            roster.insert(id);
        }
        roster
    }
}

/// A recurring weekly class definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassTemplate {
    pub id: ClassId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub difficulty: Difficulty,
    pub day_of_week: Weekday,
    pub start_time: TimeOfDay,
    pub duration_minutes: u32,
    /// Base instructor; substitutions override it per date
    pub instructor_id: InstructorId,
    pub capacity: u32,
    pub points_cost: Decimal,
    pub bookings: BTreeMap<DateKey, Roster>,
    pub substitutions: BTreeMap<DateKey, InstructorId>,
    pub created_at: DateKey,
    pub archived: bool,
    pub archived_at: Option<DateKey>,
}

impl ClassTemplate {
    /// Build a fresh, unarchived template from a validated draft
    pub fn from_draft(id: ClassId, draft: ClassDraft, created_at: DateKey) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            location: draft.location,
            difficulty: draft.difficulty,
            day_of_week: draft.day_of_week,
            start_time: draft.start_time,
            duration_minutes: draft.duration_minutes,
            instructor_id: draft.instructor_id,
            capacity: draft.capacity,
            points_cost: draft.points_cost,
            bookings: BTreeMap::new(),
            substitutions: BTreeMap::new(),
            created_at,
            archived: false,
            archived_at: None,
        }
    }

    /// Half-open `[start, end)` in minutes since midnight
    pub fn interval(&self) -> (u32, u32) {
        let start = self.start_time.minutes_since_midnight();
        (start, start + self.duration_minutes)
    }

    pub fn is_active(&self) -> bool {
        !self.archived
    }

    /// Whether this version of the class was running on `date`
    ///
    /// Archived versions stay effective through their `archived_at` day.
    /// An archived template without a cutoff has no known end.
    pub fn is_effective_on(&self, date: DateKey) -> bool {
        if self.created_at > date {
            return false;
        }
        if !self.archived {
            return true;
        }
        self.archived_at.map_or(true, |cutoff| cutoff >= date)
    }

    pub fn instructor_on(&self, date: DateKey) -> &InstructorId {
        self.substitutions.get(&date).unwrap_or(&self.instructor_id)
    }

    pub fn roster_on(&self, date: DateKey) -> Option<&Roster> {
        self.bookings.get(&date)
    }

    /// Whether any roster dated `from` or later holds a student
    pub fn has_bookings_from(&self, from: DateKey) -> bool {
        self.bookings.range(from..).any(|(_, roster)| !roster.is_empty())
    }

    /// Copy of the editable fields, for building an update
    pub fn to_draft(&self) -> ClassDraft {
        ClassDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            difficulty: self.difficulty,
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            instructor_id: self.instructor_id.clone(),
            capacity: self.capacity,
            points_cost: self.points_cost,
        }
    }

    /// Overwrite the editable fields in place, keeping id, maps and lifecycle
    pub fn apply_draft(&mut self, draft: ClassDraft) {
        self.title = draft.title;
        self.description = draft.description;
        self.location = draft.location;
        self.difficulty = draft.difficulty;
        self.day_of_week = draft.day_of_week;
        self.start_time = draft.start_time;
        self.duration_minutes = draft.duration_minutes;
        self.instructor_id = draft.instructor_id;
        self.capacity = draft.capacity;
        self.points_cost = draft.points_cost;
    }
}

/// Editable fields of a class template, as submitted by an admin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub day_of_week: Weekday,
    pub start_time: TimeOfDay,
    pub duration_minutes: u32,
    pub instructor_id: InstructorId,
    pub capacity: u32,
    #[serde(default = "default_points_cost")]
    pub points_cost: Decimal,
}

fn default_points_cost() -> Decimal {
    Decimal::ONE
}

const MINUTES_PER_DAY: u32 = 24 * 60;

impl ClassDraft {
    /// Reject malformed input before any store access
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        if self.capacity == 0 {
            return Err(Error::Validation("capacity must be positive".into()));
        }
        if self.duration_minutes == 0 {
            return Err(Error::Validation("duration must be positive".into()));
        }
        if self.start_time.minutes_since_midnight() + self.duration_minutes > MINUTES_PER_DAY {
            return Err(Error::Validation("class must end before midnight".into()));
        }
        if self.points_cost.is_sign_negative() {
            return Err(Error::Validation("points cost must not be negative".into()));
        }
        if self.instructor_id.as_str().trim().is_empty() {
            return Err(Error::Validation("instructor is required".into()));
        }
        Ok(())
    }
}
