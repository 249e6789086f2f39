//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use std::str::FromStr;

use chrono::Weekday;
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use rust_decimal::Decimal;

use crate::models::{
    weekday_from_number, DateKey, Difficulty, MembershipType, Role, TimeOfDay,
};

fn conversion_error<E>(e: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e))
}

fn invalid_value(what: &str, value: &str) -> SqlError {
    conversion_error(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {what}: {value}"),
    ))
}

/// Parse a date-key column
pub fn parse_date_key(s: &str) -> Result<DateKey, SqlError> {
    DateKey::from_str(s).map_err(conversion_error)
}

/// Parse an optional date-key column
pub fn parse_date_key_opt(s: Option<String>) -> Result<Option<DateKey>, SqlError> {
    s.map(|s| parse_date_key(&s)).transpose()
}

/// Parse an `HH:MM` column
pub fn parse_time(s: &str) -> Result<TimeOfDay, SqlError> {
    TimeOfDay::from_str(s).map_err(conversion_error)
}

/// Parse a decimal stored as text
pub fn parse_decimal(s: &str) -> Result<Decimal, SqlError> {
    Decimal::from_str(s).map_err(conversion_error)
}

/// Parse a 1..7 weekday column
pub fn parse_weekday(n: u8) -> Result<Weekday, SqlError> {
    weekday_from_number(n).ok_or_else(|| invalid_value("weekday", &n.to_string()))
}

pub fn parse_difficulty(s: &str) -> Result<Difficulty, SqlError> {
    Difficulty::parse(s).ok_or_else(|| invalid_value("difficulty", s))
}

pub fn parse_membership(s: &str) -> Result<MembershipType, SqlError> {
    MembershipType::parse(s).ok_or_else(|| invalid_value("membership", s))
}

/// Convert a u8 to Role
pub fn role_from_u8(value: u8) -> Role {
    match value {
        3 => Role::Admin,
        2 => Role::Student,
        _ => Role::Guest,
    }
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
