//! Read-only views: the live board, student schedules and ghost reports

use std::collections::HashSet;
use std::io::Write;

use clap::Args;
use studio_core::{
    student_schedule, upcoming_board, ClassFilter, ClassRepository, DateKey, StudioAction,
    UserId, UserRepository,
};
use tracing::warn;

use super::{write_occurrence, Session};
use crate::error::AppResult;

#[derive(Args)]
pub struct BoardCmd;

impl BoardCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let templates = session.db.list_classes(ClassFilter::Active)?;
        let board = upcoming_board(&templates, session.clock.now());
        let names = session.instructor_names()?;

        if board.is_empty() {
            writeln!(out, "No classes scheduled.")?;
            return Ok(());
        }
        for occurrence in &board {
            write_occurrence(out, occurrence, &names)?;
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ScheduleCmd {
    /// Student to list (default: the acting user)
    #[arg(long)]
    pub student: Option<String>,

    /// First date to include (default: today)
    #[arg(long)]
    pub from: Option<DateKey>,
}

impl ScheduleCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let student = match &self.student {
            Some(id) => UserId::new(id.as_str()),
            None => session.principal.user_id.clone(),
        };
        if student != session.principal.user_id {
            session.principal.require(StudioAction::BookOthers)?;
        }

        let templates = session.db.list_classes(ClassFilter::All)?;
        let from = self.from.unwrap_or_else(|| session.clock.today());
        let schedule = student_schedule(&templates, &student, from);
        let names = session.instructor_names()?;

        if schedule.is_empty() {
            writeln!(out, "No bookings for {student} from {from}.")?;
            return Ok(());
        }
        for occurrence in &schedule {
            write_occurrence(out, occurrence, &names)?;
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct GhostsCmd;

impl GhostsCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        session.principal.require(StudioAction::RepairRoster)?;

        let known: HashSet<UserId> = session
            .db
            .list_users()?
            .into_iter()
            .map(|u| u.id)
            .collect();
        let templates = session.db.list_classes(ClassFilter::Active)?;
        let today = session.clock.today();

        let mut found = 0;
        for template in &templates {
            for (date, _) in template.bookings.range(today..) {
                let occurrence = studio_core::project(template, *date);
                let ghosts = occurrence.ghost_ids(&known);
                if ghosts.is_empty() {
                    continue;
                }
                found += ghosts.len();
                warn!(class_id = %template.id, %date, count = ghosts.len(), "Ghost roster entries");
                let ids: Vec<&str> = ghosts.iter().map(|g| g.as_str()).collect();
                writeln!(
                    out,
                    "#{} {} {}: {}",
                    template.id,
                    date,
                    template.title,
                    ids.join(", ")
                )?;
            }
        }

        if found == 0 {
            writeln!(out, "No ghost entries.")?;
        }
        Ok(())
    }
}
