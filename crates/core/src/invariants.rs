//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use rust_decimal::Decimal;

use crate::models::{ClassId, ClassTemplate, DateKey, UserId};

/// Validate that a template's fields are internally consistent
pub fn assert_template_invariants(template: &ClassTemplate) {
    debug_assert!(
        template.capacity > 0,
        "Class {} has zero capacity",
        template.id
    );

    debug_assert!(
        !template.title.trim().is_empty(),
        "Class {} has empty title",
        template.id
    );

    // An archive cutoff only makes sense on an archived template
    debug_assert!(
        template.archived || template.archived_at.is_none(),
        "Class {} is active but has archived_at {:?}",
        template.id,
        template.archived_at
    );

    debug_assert!(
        template.points_cost >= Decimal::ZERO,
        "Class {} has negative cost {}",
        template.id,
        template.points_cost
    );
}

/// Validate that a roster never exceeds capacity
pub fn assert_roster_within_capacity(id: ClassId, date: DateKey, len: usize, capacity: u32) {
    debug_assert!(
        len <= capacity as usize,
        "Class {} on {} holds {} students, capacity {}",
        id,
        date,
        len,
        capacity
    );
}

/// Validate that a credit balance never goes negative
pub fn assert_balance_non_negative(user_id: &UserId, balance: Decimal) {
    debug_assert!(
        balance >= Decimal::ZERO,
        "User {} would end with negative balance {}",
        user_id,
        balance
    );
}
