//! Studio user model: role, membership and credit balance

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::calendar::DateKey;

/// Identifier handed out by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Studio roles in priority order (highest to lowest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    /// Full control over classes, rosters and balances
    Admin = 3,
    /// Books and cancels their own classes
    Student = 2,
    /// Can be placed on a roster by an admin; no membership checks
    Guest = 1,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Student => "STUDENT",
            Role::Guest => "GUEST",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipType {
    /// Pays `points_cost` per booking from the credit balance
    #[default]
    Credit,
    /// Books freely until `unlimited_expiry`
    Unlimited,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Credit => "CREDIT",
            MembershipType::Unlimited => "UNLIMITED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREDIT" => Some(Self::Credit),
            "UNLIMITED" => Some(Self::Unlimited),
            _ => None,
        }
    }
}

/// A studio user as known to the booking core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub membership: MembershipType,
    pub credits: Decimal,
    pub unlimited_expiry: Option<DateKey>,
}

impl User {
    pub fn new(id: UserId, name: String, role: Role) -> Self {
        Self {
            id,
            name,
            phone: None,
            role,
            membership: MembershipType::Credit,
            credits: Decimal::ZERO,
            unlimited_expiry: None,
        }
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    /// Unlimited membership that covers `date`
    pub fn unlimited_covers(&self, date: DateKey) -> bool {
        self.membership == MembershipType::Unlimited
            && self.unlimited_expiry.is_some_and(|expiry| expiry >= date)
    }
}

/// Normalise a credit amount to two decimal places
pub fn round_credits(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
