//! Error types for the studio core

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::TimeOfDay;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Booking opens at {opens_at}")]
    TooEarly { opens_at: NaiveDateTime },

    #[error("Membership invalid: {0}")]
    MembershipInvalid(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: Decimal, available: Decimal },

    #[error("Already booked into {title} at {start_time}")]
    TimeConflict { title: String, start_time: TimeOfDay },

    #[error("Class is full ({capacity} places)")]
    Full { capacity: u32 },

    #[error("Instructor already teaches {title} at {start_time}")]
    InstructorConflict { title: String, start_time: TimeOfDay },

    #[error("Class has already started")]
    AlreadyStarted,

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable failure codes handed to callers for message rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    TooEarly,
    MembershipInvalid,
    InsufficientCredits,
    TimeConflict,
    Full,
    InstructorConflict,
    AlreadyStarted,
    TransactionAborted,
    Validation,
    InvalidOperation,
    Notification,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::TooEarly => "TOO_EARLY",
            ErrorKind::MembershipInvalid => "MEMBERSHIP_INVALID",
            ErrorKind::InsufficientCredits => "INSUFFICIENT_CREDITS",
            ErrorKind::TimeConflict => "TIME_CONFLICT",
            ErrorKind::Full => "FULL",
            ErrorKind::InstructorConflict => "INSTRUCTOR_CONFLICT",
            ErrorKind::AlreadyStarted => "ALREADY_STARTED",
            ErrorKind::TransactionAborted => "TRANSACTION_ABORTED",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::InvalidOperation => "INVALID_OPERATION",
            ErrorKind::Notification => "NOTIFICATION",
            ErrorKind::Storage => "STORAGE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::TooEarly { .. } => ErrorKind::TooEarly,
            Error::MembershipInvalid(_) => ErrorKind::MembershipInvalid,
            Error::InsufficientCredits { .. } => ErrorKind::InsufficientCredits,
            Error::TimeConflict { .. } => ErrorKind::TimeConflict,
            Error::Full { .. } => ErrorKind::Full,
            Error::InstructorConflict { .. } => ErrorKind::InstructorConflict,
            Error::AlreadyStarted => ErrorKind::AlreadyStarted,
            Error::TransactionAborted(_) => ErrorKind::TransactionAborted,
            Error::Validation(_) => ErrorKind::Validation,
            Error::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Error::Notification(_) => ErrorKind::Notification,
            Error::Database(_) | Error::Io(_) | Error::Serialization(_) => ErrorKind::Storage,
        }
    }

    /// Whether the student should be routed to a top-up flow rather than blocked
    pub fn suggests_top_up(&self) -> bool {
        matches!(self, Error::InsufficientCredits { .. })
    }

    /// SQLite reported lock contention (the write lock could not be taken in time)
    pub(crate) fn is_busy(&self) -> bool {
        match self {
            Error::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}
