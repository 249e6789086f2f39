//! Class template storage operations

use std::collections::{BTreeMap, HashMap};

use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use tracing::instrument;

use super::parse::{
    parse_date_key, parse_date_key_opt, parse_decimal, parse_difficulty, parse_time,
    parse_weekday, OptionalExt,
};
use crate::error::Result;
use crate::models::{
    weekday_number, ClassId, ClassTemplate, DateKey, InstructorId, Roster, UserId,
};

/// Equality filter for class snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassFilter {
    /// Bookable templates (not archived)
    Active,
    /// Historical templates only
    Archived,
    /// Both, for historical reconstruction
    All,
}

impl ClassFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            ClassFilter::Active => "WHERE archived = 0",
            ClassFilter::Archived => "WHERE archived = 1",
            ClassFilter::All => "",
        }
    }
}

/// One roster row with the amount charged when it was booked
#[derive(Debug, Clone, PartialEq)]
pub struct BookingCharge {
    pub date: DateKey,
    pub student_id: UserId,
    pub charged: Decimal,
}

const CLASS_COLUMNS: &str = "id, title, description, location, difficulty, day_of_week, start_time,
     duration_minutes, instructor_id, capacity, points_cost, created_at, archived, archived_at";

fn class_from_row(row: &Row<'_>) -> rusqlite::Result<ClassTemplate> {
    Ok(ClassTemplate {
        id: ClassId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        difficulty: parse_difficulty(&row.get::<_, String>(4)?)?,
        day_of_week: parse_weekday(row.get(5)?)?,
        start_time: parse_time(&row.get::<_, String>(6)?)?,
        duration_minutes: row.get(7)?,
        instructor_id: InstructorId::new(row.get::<_, String>(8)?),
        capacity: row.get(9)?,
        points_cost: parse_decimal(&row.get::<_, String>(10)?)?,
        bookings: BTreeMap::new(),
        substitutions: BTreeMap::new(),
        created_at: parse_date_key(&row.get::<_, String>(11)?)?,
        archived: row.get::<_, i32>(12)? != 0,
        archived_at: parse_date_key_opt(row.get(13)?)?,
    })
}

pub struct ClassStore<'a> {
    conn: &'a Connection,
}

impl<'a> ClassStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a template together with its per-date maps
    #[instrument(skip(self, template), fields(class_id = %template.id, title = %template.title))]
    pub fn create(&self, template: &ClassTemplate) -> Result<()> {
        self.conn.execute(
            "INSERT INTO classes (id, title, description, location, difficulty, day_of_week, start_time,
                 duration_minutes, instructor_id, capacity, points_cost, created_at, archived, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                template.id.0,
                template.title,
                template.description,
                template.location,
                template.difficulty.as_str(),
                weekday_number(template.day_of_week),
                template.start_time.to_string(),
                template.duration_minutes,
                template.instructor_id.as_str(),
                template.capacity,
                template.points_cost.to_string(),
                template.created_at.to_string(),
                template.archived as i32,
                template.archived_at.map(|d| d.to_string()),
            ],
        )?;

        for (date, roster) in &template.bookings {
            for student in roster.iter() {
                self.add_booking(template.id, *date, student, Decimal::ZERO)?;
            }
        }
        for (date, instructor) in &template.substitutions {
            self.set_substitution(template.id, *date, instructor)?;
        }
        Ok(())
    }

    /// Find a template by ID, maps included
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: ClassId) -> Result<Option<ClassTemplate>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?1"))?;

        let template = stmt.query_row(params![id.0], class_from_row).optional()?;

        match template {
            Some(mut template) => {
                self.load_maps(std::slice::from_mut(&mut template), Some(id))?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    /// Snapshot of all templates matching `filter`, ordered by weekday and start
    #[instrument(skip(self))]
    pub fn list(&self, filter: ClassFilter) -> Result<Vec<ClassTemplate>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes {} ORDER BY day_of_week, start_time, id",
            filter.where_clause()
        ))?;

        let mut templates = stmt
            .query_map([], class_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.load_maps(&mut templates, None)?;
        Ok(templates)
    }

    /// Attach bookings and substitutions to already-loaded rows
    fn load_maps(&self, templates: &mut [ClassTemplate], only: Option<ClassId>) -> Result<()> {
        if templates.is_empty() {
            return Ok(());
        }
        let index: HashMap<ClassId, usize> = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, i))
            .collect();
        let scope = only.map(|id| id.0 as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(
            "SELECT class_id, date_key, student_id FROM class_bookings
             WHERE ?1 = -1 OR class_id = ?1
             ORDER BY class_id, date_key, position",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok((
                ClassId(row.get(0)?),
                parse_date_key(&row.get::<_, String>(1)?)?,
                UserId::new(row.get::<_, String>(2)?),
            ))
        })?;
        for row in rows {
            let (class_id, date, student) = row?;
            if let Some(&i) = index.get(&class_id) {
                templates[i].bookings.entry(date).or_default().insert(student);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT class_id, date_key, instructor_id FROM class_substitutions
             WHERE ?1 = -1 OR class_id = ?1",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok((
                ClassId(row.get(0)?),
                parse_date_key(&row.get::<_, String>(1)?)?,
                InstructorId::new(row.get::<_, String>(2)?),
            ))
        })?;
        for row in rows {
            let (class_id, date, instructor) = row?;
            if let Some(&i) = index.get(&class_id) {
                templates[i].substitutions.insert(date, instructor);
            }
        }
        Ok(())
    }

    /// Next unused sequential ID
    #[instrument(skip(self))]
    pub fn next_id(&self) -> Result<ClassId> {
        let max: u32 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM classes", [], |row| row.get(0))?;
        Ok(ClassId(max + 1))
    }

    /// Update the scheduling fields of a template (maps untouched)
    #[instrument(skip(self, template), fields(class_id = %template.id))]
    pub fn update(&self, template: &ClassTemplate) -> Result<()> {
        self.conn.execute(
            "UPDATE classes SET title = ?1, description = ?2, location = ?3, difficulty = ?4,
                 day_of_week = ?5, start_time = ?6, duration_minutes = ?7, instructor_id = ?8,
                 capacity = ?9, points_cost = ?10
             WHERE id = ?11",
            params![
                template.title,
                template.description,
                template.location,
                template.difficulty.as_str(),
                weekday_number(template.day_of_week),
                template.start_time.to_string(),
                template.duration_minutes,
                template.instructor_id.as_str(),
                template.capacity,
                template.points_cost.to_string(),
                template.id.0,
            ],
        )?;
        Ok(())
    }

    /// Mark a template archived as of `archived_at`
    #[instrument(skip(self))]
    pub fn archive(&self, id: ClassId, archived_at: DateKey) -> Result<()> {
        self.conn.execute(
            "UPDATE classes SET archived = 1, archived_at = ?1 WHERE id = ?2",
            params![archived_at.to_string(), id.0],
        )?;
        Ok(())
    }

    /// Hard delete (maps cascade)
    #[instrument(skip(self))]
    pub fn delete(&self, id: ClassId) -> Result<()> {
        self.conn
            .execute("DELETE FROM classes WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    /// Authoritative roster for one date
    #[instrument(skip(self))]
    pub fn roster(&self, id: ClassId, date: DateKey) -> Result<Roster> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id FROM class_bookings
             WHERE class_id = ?1 AND date_key = ?2
             ORDER BY position",
        )?;
        let roster = stmt
            .query_map(params![id.0, date.to_string()], |row| {
                Ok(UserId::new(row.get::<_, String>(0)?))
            })?
            .collect::<std::result::Result<Roster, _>>()?;
        Ok(roster)
    }

    /// Append a student to a date's roster
    #[instrument(skip(self, student), fields(student_id = %student))]
    pub(crate) fn add_booking(
        &self,
        id: ClassId,
        date: DateKey,
        student: &UserId,
        charged: Decimal,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO class_bookings (class_id, date_key, student_id, position, charged)
             VALUES (?1, ?2, ?3,
                 (SELECT COALESCE(MAX(position), 0) + 1 FROM class_bookings
                  WHERE class_id = ?1 AND date_key = ?2),
                 ?4)",
            params![id.0, date.to_string(), student.as_str(), charged.to_string()],
        )?;
        Ok(())
    }

    /// Remove a student from a date's roster, returning what they were charged
    #[instrument(skip(self, student), fields(student_id = %student))]
    pub(crate) fn remove_booking(
        &self,
        id: ClassId,
        date: DateKey,
        student: &UserId,
    ) -> Result<Option<Decimal>> {
        let charged = self
            .conn
            .query_row(
                "SELECT charged FROM class_bookings
                 WHERE class_id = ?1 AND date_key = ?2 AND student_id = ?3",
                params![id.0, date.to_string(), student.as_str()],
                |row| parse_decimal(&row.get::<_, String>(0)?),
            )
            .optional()?;

        if charged.is_some() {
            self.conn.execute(
                "DELETE FROM class_bookings WHERE class_id = ?1 AND date_key = ?2 AND student_id = ?3",
                params![id.0, date.to_string(), student.as_str()],
            )?;
        }
        Ok(charged)
    }

    /// Every booking dated `from` or later, with its charge
    #[instrument(skip(self))]
    pub fn charges_from(&self, id: ClassId, from: DateKey) -> Result<Vec<BookingCharge>> {
        let mut stmt = self.conn.prepare(
            "SELECT date_key, student_id, charged FROM class_bookings
             WHERE class_id = ?1 AND date_key >= ?2
             ORDER BY date_key, position",
        )?;
        let charges = stmt
            .query_map(params![id.0, from.to_string()], |row| {
                Ok(BookingCharge {
                    date: parse_date_key(&row.get::<_, String>(0)?)?,
                    student_id: UserId::new(row.get::<_, String>(1)?),
                    charged: parse_decimal(&row.get::<_, String>(2)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(charges)
    }

    /// Drop every roster entry dated `from` or later
    #[instrument(skip(self))]
    pub(crate) fn clear_bookings_from(&self, id: ClassId, from: DateKey) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM class_bookings WHERE class_id = ?1 AND date_key >= ?2",
            params![id.0, from.to_string()],
        )?;
        Ok(removed)
    }

    /// Rewrite a date's roster down to `keep`, preserving order and charges
    ///
    /// Only the explicit ghost repair may call this.
    #[instrument(skip(self, keep))]
    pub(crate) fn retain_roster(&self, id: ClassId, date: DateKey, keep: &[UserId]) -> Result<usize> {
        let current = self.roster(id, date)?;
        let mut removed = 0;
        for student in current.iter().filter(|s| !keep.contains(s)) {
            removed += self.conn.execute(
                "DELETE FROM class_bookings WHERE class_id = ?1 AND date_key = ?2 AND student_id = ?3",
                params![id.0, date.to_string(), student.as_str()],
            )?;
        }
        Ok(removed)
    }

    /// Set or replace the substitute instructor for one date
    #[instrument(skip(self))]
    pub fn set_substitution(
        &self,
        id: ClassId,
        date: DateKey,
        instructor: &InstructorId,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO class_substitutions (class_id, date_key, instructor_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(class_id, date_key) DO UPDATE SET instructor_id = ?3",
            params![id.0, date.to_string(), instructor.as_str()],
        )?;
        Ok(())
    }

    /// Remove the substitution for one date; returns whether one existed
    #[instrument(skip(self))]
    pub fn clear_substitution(&self, id: ClassId, date: DateKey) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM class_substitutions WHERE class_id = ?1 AND date_key = ?2",
            params![id.0, date.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Strip roster and substitution entries dated before `threshold`
    #[instrument(skip(self))]
    pub(crate) fn compact_before(&self, id: ClassId, threshold: DateKey) -> Result<usize> {
        let bookings = self.conn.execute(
            "DELETE FROM class_bookings WHERE class_id = ?1 AND date_key < ?2",
            params![id.0, threshold.to_string()],
        )?;
        let substitutions = self.conn.execute(
            "DELETE FROM class_substitutions WHERE class_id = ?1 AND date_key < ?2",
            params![id.0, threshold.to_string()],
        )?;
        Ok(bookings + substitutions)
    }

    /// Archived templates whose reference date is before `threshold`
    #[instrument(skip(self))]
    pub fn archived_before(&self, threshold: DateKey) -> Result<Vec<ClassId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM classes
             WHERE archived = 1 AND COALESCE(archived_at, created_at) < ?1
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![threshold.to_string()], |row| Ok(ClassId(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Active templates holding any per-date entry before `threshold`
    #[instrument(skip(self))]
    pub fn active_with_entries_before(&self, threshold: DateKey) -> Result<Vec<ClassId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM classes c
             WHERE archived = 0 AND (
                 EXISTS (SELECT 1 FROM class_bookings b WHERE b.class_id = c.id AND b.date_key < ?1)
                 OR EXISTS (SELECT 1 FROM class_substitutions s WHERE s.class_id = c.id AND s.date_key < ?1)
             )
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![threshold.to_string()], |row| Ok(ClassId(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
