//! Subcommand implementations
//!
//! Every command runs against a resolved [`Session`] and writes its report
//! to the given output, so the same code serves the terminal and tests.

mod admin;
mod board;
mod booking;
mod classes;

use std::collections::HashMap;
use std::io::Write;

use studio_core::{
    weekday_label, Clock, Database, Error, InstructorId, InstructorRepository, Notifier,
    Occurrence, Principal, RolePolicy, UserId, UserRepository,
};
use tracing::debug;

use crate::error::AppResult;

pub use admin::{InstructorCmd, PayrollCmd, PruneCmd, SettingsCmd, UserCmd};
pub use board::{BoardCmd, GhostsCmd, ScheduleCmd};
pub use booking::{BookCmd, CancelCmd, CreditsCmd, MembershipCmd, RepairCmd};
pub use classes::ClassCmd;

/// Everything a command needs: storage, time, delivery and who is acting
pub struct Session<'a> {
    pub db: &'a Database,
    pub clock: &'a dyn Clock,
    pub notifier: &'a dyn Notifier,
    pub principal: Principal,
}

impl<'a> Session<'a> {
    /// Resolve the acting principal through the role policy
    ///
    /// Configured administrators may act before they exist as users, which
    /// is how a fresh database gets its first accounts.
    pub fn resolve(
        db: &'a Database,
        clock: &'a dyn Clock,
        notifier: &'a dyn Notifier,
        policy: &RolePolicy,
        actor: &UserId,
    ) -> AppResult<Self> {
        let principal = match db.find_user(actor)? {
            Some(user) => policy.session(&user),
            None if policy.is_admin(actor) => {
                debug!(%actor, "Acting as configured administrator without a user record");
                Principal::new(actor.clone(), studio_core::Role::Admin)
            }
            None => return Err(Error::NotFound(format!("user {actor}")).into()),
        };

        debug!(actor = %principal.user_id, role = %principal.role, "Session resolved");
        Ok(Self {
            db,
            clock,
            notifier,
            principal,
        })
    }

    /// Instructor display names keyed by id
    fn instructor_names(&self) -> AppResult<HashMap<InstructorId, String>> {
        Ok(self
            .db
            .list_instructors()?
            .into_iter()
            .map(|i| (i.id, i.name))
            .collect())
    }
}

/// One board line: when, what, who teaches and how full
fn write_occurrence(
    out: &mut dyn Write,
    occurrence: &Occurrence,
    names: &HashMap<InstructorId, String>,
) -> std::io::Result<()> {
    let name = |id: &InstructorId| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    let teacher = if occurrence.is_substitute {
        format!(
            "{} (covering {})",
            name(&occurrence.effective_instructor_id),
            name(&occurrence.base_instructor_id)
        )
    } else {
        name(&occurrence.effective_instructor_id)
    };

    writeln!(
        out,
        "{} {} {}  #{:<4} {:<24} {:<28} {}/{}",
        occurrence.date,
        weekday_label(occurrence.date.weekday()),
        occurrence.start_time,
        occurrence.template_id,
        occurrence.title,
        teacher,
        occurrence.roster.len(),
        occurrence.capacity,
    )
}
