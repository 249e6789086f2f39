//! Permission system for studio operations

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Role, User, UserId};

/// Actions that can be performed against the booking core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioAction {
    // Bookings
    BookSelf,
    BookOthers,
    CancelSelf,
    CancelOthers,
    BypassBookingWindow,
    OverrideMembership,
    CancelStartedClass,

    // Balances
    AdjustCredits,
    AssignMembership,

    // Classes
    ManageClasses,
    ManageSubstitutions,
    RepairRoster,

    // Maintenance and reports
    ManageStudio,
    PruneArchive,
    ViewPayroll,
}

/// Permission matrix for studio roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a role has permission to perform an action
    pub fn can_perform(role: Role, action: StudioAction) -> bool {
        match action {
            // Students manage their own bookings
            StudioAction::BookSelf => role >= Role::Student,
            StudioAction::CancelSelf => role >= Role::Student,

            // Everything else is admin only
            StudioAction::BookOthers
            | StudioAction::CancelOthers
            | StudioAction::BypassBookingWindow
            | StudioAction::OverrideMembership
            | StudioAction::CancelStartedClass
            | StudioAction::AdjustCredits
            | StudioAction::AssignMembership
            | StudioAction::ManageClasses
            | StudioAction::ManageSubstitutions
            | StudioAction::RepairRoster
            | StudioAction::ManageStudio
            | StudioAction::PruneArchive
            | StudioAction::ViewPayroll => role == Role::Admin,
        }
    }
}

/// The acting principal for one session, as resolved at session start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can(&self, action: StudioAction) -> bool {
        PermissionMatrix::can_perform(self.role, action)
    }

    /// Fail with `PermissionDenied` unless the role allows `action`
    pub fn require(&self, action: StudioAction) -> Result<()> {
        if self.can(action) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "{} may not perform {:?}",
                self.role, action
            )))
        }
    }

    /// Require `own` when acting on oneself, `others` otherwise
    pub fn require_for(&self, target: &UserId, own: StudioAction, others: StudioAction) -> Result<()> {
        if &self.user_id == target {
            self.require(own)
        } else {
            self.require(others)
        }
    }
}

/// Explicit role assignment consulted when a session starts
///
/// The identity provider's role is taken as-is unless the user id is listed
/// as a studio administrator.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    admin_ids: HashSet<UserId>,
}

impl RolePolicy {
    pub fn new<I: IntoIterator<Item = UserId>>(admin_ids: I) -> Self {
        Self {
            admin_ids: admin_ids.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, user_id: &UserId) -> bool {
        self.admin_ids.contains(user_id)
    }

    pub fn role_for(&self, user_id: &UserId, provided: Role) -> Role {
        if self.is_admin(user_id) {
            Role::Admin
        } else {
            provided
        }
    }

    /// Resolve the session principal for a stored user
    pub fn session(&self, user: &User) -> Principal {
        Principal::new(user.id.clone(), self.role_for(&user.id, user.role))
    }
}
