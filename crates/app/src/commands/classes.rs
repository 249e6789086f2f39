//! Class template management

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use studio_core::{
    weekday_label, ClassDraft, ClassFilter, ClassId, ClassLifecycle, ClassRepository, DateKey,
    DeleteOutcome, InstructorId, Refund, StudioAction, UpdateOutcome,
};
use tracing::debug;

use super::Session;
use crate::error::AppResult;

#[derive(Subcommand)]
pub enum ClassCmd {
    /// List class templates
    List {
        /// Include archived versions
        #[arg(long)]
        archived: bool,
    },

    /// Create a class from a TOML draft
    Add {
        /// Draft file with title, day_of_week, start_time, ...
        file: PathBuf,
    },

    /// Replace a class's editable fields from a TOML draft
    Edit {
        id: u32,
        file: PathBuf,
    },

    /// Archive a class, refunding upcoming bookings
    Delete { id: u32 },

    /// Put a substitute on one occurrence
    Sub(SubArgs),

    /// Remove the substitute from one occurrence
    Unsub {
        id: u32,
        #[arg(long)]
        date: DateKey,
    },
}

#[derive(Args)]
pub struct SubArgs {
    pub id: u32,

    #[arg(long)]
    pub date: DateKey,

    #[arg(long)]
    pub instructor: String,
}

fn read_draft(path: &Path) -> AppResult<ClassDraft> {
    let text = fs::read_to_string(path)?;
    let draft: ClassDraft = toml::from_str(&text)?;
    debug!(path = %path.display(), title = %draft.title, "Draft loaded");
    Ok(draft)
}

fn write_refunds(out: &mut dyn Write, refunds: &[Refund], notified: bool) -> AppResult<()> {
    for refund in refunds {
        writeln!(
            out,
            "  refunded {} to {} ({} bookings)",
            refund.amount,
            refund.student_id,
            refund.dates.len()
        )?;
    }
    if !refunds.is_empty() && !notified {
        writeln!(out, "  students could not be notified")?;
    }
    Ok(())
}

impl ClassCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let lifecycle = ClassLifecycle::new(session.db, session.clock, session.notifier);
        let principal = &session.principal;

        match self {
            ClassCmd::List { archived } => {
                let filter = if *archived {
                    ClassFilter::All
                } else {
                    ClassFilter::Active
                };
                let templates = session.db.list_classes(filter)?;
                if templates.is_empty() {
                    writeln!(out, "No classes.")?;
                }
                for t in &templates {
                    let state = match (t.archived, t.archived_at) {
                        (false, _) => String::new(),
                        (true, Some(at)) => format!("  [archived {at}]"),
                        (true, None) => "  [archived]".to_string(),
                    };
                    writeln!(
                        out,
                        "#{:<4} {} {} {}min  {:<24} {} cap {} cost {}{}",
                        t.id,
                        weekday_label(t.day_of_week),
                        t.start_time,
                        t.duration_minutes,
                        t.title,
                        t.instructor_id,
                        t.capacity,
                        t.points_cost,
                        state
                    )?;
                }
            }

            ClassCmd::Add { file } => {
                let draft = read_draft(file)?;
                let template = lifecycle.create(principal, draft)?;
                writeln!(
                    out,
                    "Created #{} {} on {} at {}",
                    template.id,
                    template.title,
                    weekday_label(template.day_of_week),
                    template.start_time
                )?;
            }

            ClassCmd::Edit { id, file } => {
                // Fail on permissions before touching the file system
                principal.require(StudioAction::ManageClasses)?;
                let draft = read_draft(file)?;
                match lifecycle.update(principal, ClassId(*id), draft)? {
                    UpdateOutcome::Updated(template) => {
                        writeln!(out, "Updated #{} {}", template.id, template.title)?;
                    }
                    UpdateOutcome::Forked {
                        archived,
                        successor,
                        refunds,
                        notified,
                    } => {
                        writeln!(
                            out,
                            "Archived #{archived}; #{} now taught by {}",
                            successor.id, successor.instructor_id
                        )?;
                        write_refunds(out, &refunds, notified)?;
                    }
                }
            }

            ClassCmd::Delete { id } => match lifecycle.delete(principal, ClassId(*id))? {
                DeleteOutcome::Archived => writeln!(out, "Archived #{id}")?,
                DeleteOutcome::Refunded { refunds, notified } => {
                    writeln!(out, "Archived #{id}")?;
                    write_refunds(out, &refunds, notified)?;
                }
            },

            ClassCmd::Sub(args) => {
                let instructor = InstructorId::new(args.instructor.as_str());
                lifecycle.assign_substitute(principal, ClassId(args.id), args.date, &instructor)?;
                writeln!(out, "#{} on {} taught by {instructor}", args.id, args.date)?;
            }

            ClassCmd::Unsub { id, date } => {
                if lifecycle.clear_substitute(principal, ClassId(*id), *date)? {
                    writeln!(out, "Substitution on #{id} {date} removed")?;
                } else {
                    writeln!(out, "No substitution on #{id} {date}")?;
                }
            }
        }
        Ok(())
    }
}
