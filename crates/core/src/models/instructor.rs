//! Instructor model

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructorId(String);

impl InstructorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstructorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for InstructorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// An instructor who can be assigned to classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructor {
    pub id: InstructorId,
    pub name: String,
    pub bio: String,
    pub image_url: Option<String>,
    pub phone_number: Option<String>,
    /// Hourly rate, only read by payroll
    pub default_rate: Decimal,
}

impl Instructor {
    pub fn new(id: InstructorId, name: String) -> Self {
        Self {
            id,
            name,
            bio: String::new(),
            image_url: None,
            phone_number: None,
            default_rate: Decimal::ZERO,
        }
    }
}
