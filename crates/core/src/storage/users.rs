//! User storage operations

use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use tracing::instrument;

use super::parse::{parse_date_key_opt, parse_decimal, parse_membership, role_from_u8, OptionalExt};
use crate::error::Result;
use crate::models::{DateKey, MembershipType, User, UserId};

const USER_COLUMNS: &str = "id, name, phone, role, membership, credits, unlimited_expiry";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        phone: row.get(2)?,
        role: role_from_u8(row.get::<_, u8>(3)?),
        membership: parse_membership(&row.get::<_, String>(4)?)?,
        credits: parse_decimal(&row.get::<_, String>(5)?)?,
        unlimited_expiry: parse_date_key_opt(row.get(6)?)?,
    })
}

pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new user
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn create(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, name, phone, role, membership, credits, unlimited_expiry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.as_str(),
                user.name,
                user.phone,
                user.role as u8,
                user.membership.as_str(),
                user.credits.to_string(),
                user.unlimited_expiry.map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Find user by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;

        let user = stmt
            .query_row(params![id.as_str()], user_from_row)
            .optional()?;

        Ok(user)
    }

    /// List all users ordered by name
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name, id"))?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Overwrite a credit balance
    #[instrument(skip(self))]
    pub(crate) fn set_credits(&self, id: &UserId, credits: Decimal) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET credits = ?1 WHERE id = ?2",
            params![credits.to_string(), id.as_str()],
        )?;
        Ok(())
    }

    /// Set membership type and unlimited expiry
    #[instrument(skip(self))]
    pub(crate) fn set_membership(
        &self,
        id: &UserId,
        membership: MembershipType,
        unlimited_expiry: Option<DateKey>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET membership = ?1, unlimited_expiry = ?2 WHERE id = ?3",
            params![
                membership.as_str(),
                unlimited_expiry.map(|d| d.to_string()),
                id.as_str()
            ],
        )?;
        Ok(())
    }

    /// Delete a user; roster entries pointing at them become ghosts
    #[instrument(skip(self))]
    pub fn delete(&self, id: &UserId) -> Result<()> {
        self.conn
            .execute("DELETE FROM users WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }
}
