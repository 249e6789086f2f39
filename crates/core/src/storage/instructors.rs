//! Instructor storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{parse_decimal, OptionalExt};
use crate::error::Result;
use crate::models::{Instructor, InstructorId};

fn instructor_from_row(row: &Row<'_>) -> rusqlite::Result<Instructor> {
    Ok(Instructor {
        id: InstructorId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        bio: row.get(2)?,
        image_url: row.get(3)?,
        phone_number: row.get(4)?,
        default_rate: parse_decimal(&row.get::<_, String>(5)?)?,
    })
}

pub struct InstructorStore<'a> {
    conn: &'a Connection,
}

impl<'a> InstructorStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, instructor), fields(instructor_id = %instructor.id))]
    pub fn create(&self, instructor: &Instructor) -> Result<()> {
        self.conn.execute(
            "INSERT INTO instructors (id, name, bio, image_url, phone_number, default_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                instructor.id.as_str(),
                instructor.name,
                instructor.bio,
                instructor.image_url,
                instructor.phone_number,
                instructor.default_rate.to_string(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self, instructor), fields(instructor_id = %instructor.id))]
    pub fn update(&self, instructor: &Instructor) -> Result<()> {
        self.conn.execute(
            "UPDATE instructors SET name = ?1, bio = ?2, image_url = ?3, phone_number = ?4, default_rate = ?5
             WHERE id = ?6",
            params![
                instructor.name,
                instructor.bio,
                instructor.image_url,
                instructor.phone_number,
                instructor.default_rate.to_string(),
                instructor.id.as_str(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: &InstructorId) -> Result<Option<Instructor>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, bio, image_url, phone_number, default_rate FROM instructors WHERE id = ?1",
        )?;

        let instructor = stmt
            .query_row(params![id.as_str()], instructor_from_row)
            .optional()?;

        Ok(instructor)
    }

    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Instructor>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, bio, image_url, phone_number, default_rate FROM instructors ORDER BY name, id",
        )?;

        let instructors = stmt
            .query_map([], instructor_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(instructors)
    }

    /// Delete an instructor; templates keep the dangling reference
    #[instrument(skip(self))]
    pub fn delete(&self, id: &InstructorId) -> Result<()> {
        self.conn
            .execute("DELETE FROM instructors WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }
}
