//! CLI argument definitions.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{
    BoardCmd, BookCmd, CancelCmd, ClassCmd, CreditsCmd, GhostsCmd, InstructorCmd, MembershipCmd,
    PayrollCmd, PruneCmd, RepairCmd, ScheduleCmd, Session, SettingsCmd, UserCmd,
};
use crate::error::AppResult;

#[derive(Parser)]
#[command(name = "studioctl")]
#[command(about = "Studio class scheduling, bookings and payroll")]
#[command(version)]
pub struct Cli {
    /// Config file (default: studio.toml in the platform config directory)
    #[arg(long, global = true, env = "STUDIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true, env = "STUDIO_DB")]
    pub db: Option<PathBuf>,

    /// User id to act as
    #[arg(long = "as", global = true, env = "STUDIO_USER")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show every active class on its next occurrence
    Board(BoardCmd),

    /// List upcoming bookings of a student
    Schedule(ScheduleCmd),

    /// Book a student into an occurrence
    Book(BookCmd),

    /// Cancel a booking and refund its charge
    Cancel(CancelCmd),

    /// Top up or correct a credit balance
    Credits(CreditsCmd),

    /// Change a student's membership plan
    Membership(MembershipCmd),

    /// Create, edit, substitute and delete classes
    #[command(subcommand)]
    Class(ClassCmd),

    /// Report roster entries that point at deleted users
    Ghosts(GhostsCmd),

    /// Remove ghost entries from one roster
    Repair(RepairCmd),

    /// Delete old archives and compact history
    Prune(PruneCmd),

    /// Instructor minutes, sessions and salaries for a date range
    Payroll(PayrollCmd),

    /// Register users handed over by the identity provider
    #[command(subcommand)]
    User(UserCmd),

    /// Register instructors
    #[command(subcommand)]
    Instructor(InstructorCmd),

    /// Show or change studio settings
    #[command(subcommand)]
    Settings(SettingsCmd),
}

impl Command {
    pub fn execute(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        match self {
            Command::Board(cmd) => cmd.run(session, out),
            Command::Schedule(cmd) => cmd.run(session, out),
            Command::Book(cmd) => cmd.run(session, out),
            Command::Cancel(cmd) => cmd.run(session, out),
            Command::Credits(cmd) => cmd.run(session, out),
            Command::Membership(cmd) => cmd.run(session, out),
            Command::Class(cmd) => cmd.run(session, out),
            Command::Ghosts(cmd) => cmd.run(session, out),
            Command::Repair(cmd) => cmd.run(session, out),
            Command::Prune(cmd) => cmd.run(session, out),
            Command::Payroll(cmd) => cmd.run(session, out),
            Command::User(cmd) => cmd.run(session, out),
            Command::Instructor(cmd) => cmd.run(session, out),
            Command::Settings(cmd) => cmd.run(session, out),
        }
    }
}
