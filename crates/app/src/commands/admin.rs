//! Studio administration: accounts, instructors, settings, pruning and payroll

use std::collections::HashMap;
use std::io::Write;

use clap::{Args, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use studio_core::{
    run_payroll, ArchivePruner, DateKey, Instructor, InstructorId, InstructorRepository,
    PayrollReport, Role, SessionKind, SettingsRepository, StudioAction, TimeOfDay, User, UserId,
    UserRepository,
};
use tracing::info;

use super::Session;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Admin,
    Student,
    Guest,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::Student => Role::Student,
            RoleArg::Guest => Role::Guest,
        }
    }
}

#[derive(Subcommand)]
pub enum UserCmd {
    /// Register a user handed over by the identity provider
    Add {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value = "student")]
        role: RoleArg,
        #[arg(long)]
        phone: Option<String>,
    },

    /// List users with their plan and balance
    List,
}

impl UserCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        session.principal.require(StudioAction::ManageStudio)?;

        match self {
            UserCmd::Add {
                id,
                name,
                role,
                phone,
            } => {
                let user_id = UserId::new(id.as_str());
                if session.db.find_user(&user_id)?.is_some() {
                    return Err(AppError::Usage(format!("user {id} already exists")));
                }
                let mut user = User::new(user_id, name.clone(), Role::from(*role));
                user.phone = phone.clone();
                session.db.create_user(&user)?;
                info!(user_id = %user.id, role = %user.role, "User registered");
                writeln!(out, "Registered {} ({})", user.id, user.role)?;
            }

            UserCmd::List => {
                for user in session.db.list_users()? {
                    let plan = match user.unlimited_expiry {
                        Some(expiry) => format!("{} until {expiry}", user.membership.as_str()),
                        None => user.membership.as_str().to_string(),
                    };
                    writeln!(
                        out,
                        "{:<16} {:<24} {:<8} {:<28} {}",
                        user.id, user.name, user.role, plan, user.credits
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Subcommand)]
pub enum InstructorCmd {
    /// Register an instructor
    Add {
        id: String,
        #[arg(long)]
        name: String,
        /// Hourly rate used by payroll
        #[arg(long)]
        rate: Option<Decimal>,
        #[arg(long)]
        phone: Option<String>,
    },

    /// List instructors and their rates
    List,
}

impl InstructorCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        session.principal.require(StudioAction::ManageStudio)?;

        match self {
            InstructorCmd::Add {
                id,
                name,
                rate,
                phone,
            } => {
                let instructor_id = InstructorId::new(id.as_str());
                let existing = session.db.find_instructor(&instructor_id)?;
                let mut instructor = existing
                    .clone()
                    .unwrap_or_else(|| Instructor::new(instructor_id, name.clone()));
                instructor.name = name.clone();
                if let Some(rate) = rate {
                    instructor.default_rate = *rate;
                }
                if phone.is_some() {
                    instructor.phone_number = phone.clone();
                }

                if existing.is_some() {
                    session.db.update_instructor(&instructor)?;
                    writeln!(out, "Updated instructor {}", instructor.id)?;
                } else {
                    session.db.create_instructor(&instructor)?;
                    writeln!(out, "Registered instructor {}", instructor.id)?;
                }
            }

            InstructorCmd::List => {
                for instructor in session.db.list_instructors()? {
                    writeln!(
                        out,
                        "{:<16} {:<24} {}",
                        instructor.id, instructor.name, instructor.default_rate
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Subcommand)]
pub enum SettingsCmd {
    /// Print the studio settings
    Show,

    /// Change one or more settings
    Set {
        /// Days before an occurrence that booking opens
        #[arg(long)]
        days_before: Option<u32>,
        /// Time of day booking opens (HH:MM)
        #[arg(long)]
        opens_at: Option<TimeOfDay>,
        /// Months of history kept by `prune`
        #[arg(long)]
        prune_months: Option<u32>,
        /// Writes per prune batch
        #[arg(long)]
        prune_batch: Option<usize>,
        /// Hourly rate for instructors without one
        #[arg(long)]
        default_rate: Option<Decimal>,
    },
}

impl SettingsCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        session.principal.require(StudioAction::ManageStudio)?;
        let mut settings = session.db.studio_settings()?;

        if let SettingsCmd::Set {
            days_before,
            opens_at,
            prune_months,
            prune_batch,
            default_rate,
        } = self
        {
            if let Some(days) = days_before {
                settings.booking_window.days_before = *days;
            }
            if let Some(at) = opens_at {
                settings.booking_window.opens_at = *at;
            }
            if let Some(months) = prune_months {
                settings.prune_months_to_keep = *months;
            }
            if let Some(batch) = prune_batch {
                if *batch == 0 {
                    return Err(AppError::Usage("prune batch must be positive".into()));
                }
                settings.prune_batch_size = *batch;
            }
            if let Some(rate) = default_rate {
                if rate.is_sign_negative() {
                    return Err(AppError::Usage("default rate must not be negative".into()));
                }
                settings.default_hourly_rate = *rate;
            }
            session.db.save_studio_settings(&settings)?;
            info!("Studio settings saved");
        }

        writeln!(
            out,
            "booking window: {} days before at {}",
            settings.booking_window.days_before, settings.booking_window.opens_at
        )?;
        writeln!(out, "prune: keep {} months, batches of {}", settings.prune_months_to_keep, settings.prune_batch_size)?;
        writeln!(out, "default hourly rate: {}", settings.default_hourly_rate)?;
        Ok(())
    }
}

#[derive(Args)]
pub struct PruneCmd {
    /// Months of history to keep (default: studio setting)
    #[arg(long)]
    pub months: Option<u32>,
}

impl PruneCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let pruner = ArchivePruner::new(session.db, session.clock)?;
        let report = match self.months {
            Some(months) => pruner.prune(&session.principal, months)?,
            None => pruner.prune_default(&session.principal)?,
        };

        writeln!(
            out,
            "Pruned history before {}: {} archived classes deleted, {} compacted ({} entries) in {} batches",
            report.threshold,
            report.templates_deleted,
            report.templates_compacted,
            report.entries_removed,
            report.batches
        )?;
        Ok(())
    }
}

/// Parse an `instructor=rate` pair
fn parse_rate(s: &str) -> Result<(String, Decimal), String> {
    let (id, rate) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INSTRUCTOR=RATE, got `{s}`"))?;
    let rate: Decimal = rate.parse().map_err(|e| format!("invalid rate `{rate}`: {e}"))?;
    if id.is_empty() || rate.is_sign_negative() {
        return Err(format!("invalid rate override `{s}`"));
    }
    Ok((id.to_string(), rate))
}

#[derive(Args)]
pub struct PayrollCmd {
    /// First day of the period
    #[arg(long)]
    pub from: DateKey,

    /// Last day of the period, inclusive
    #[arg(long)]
    pub to: DateKey,

    /// Hourly rate override, as INSTRUCTOR=RATE (repeatable)
    #[arg(long = "rate", value_parser = parse_rate)]
    pub rates: Vec<(String, Decimal)>,

    /// Print every session, not just totals
    #[arg(long)]
    pub sessions: bool,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl PayrollCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let rates: HashMap<InstructorId, Decimal> = self
            .rates
            .iter()
            .map(|(id, rate)| (InstructorId::new(id.as_str()), *rate))
            .collect();
        let report = run_payroll(session.db, &session.principal, self.from, self.to, &rates)?;

        if self.json {
            let json = serde_json::to_string_pretty(&report).map_err(studio_core::Error::from)?;
            writeln!(out, "{json}")?;
            return Ok(());
        }
        self.write_table(&report, out)
    }

    fn write_table(&self, report: &PayrollReport, out: &mut dyn Write) -> AppResult<()> {
        writeln!(out, "Payroll {} to {}", report.start, report.end)?;
        for pay in &report.instructors {
            writeln!(
                out,
                "{:<24} {:>3} classes {:>5} min  @ {:<6} = {}",
                pay.name, pay.class_count, pay.total_minutes, pay.rate, pay.salary
            )?;
            if !self.sessions {
                continue;
            }
            for log in &pay.sessions {
                let cover = match (&log.kind, &log.original_instructor_name) {
                    (SessionKind::Sub, Some(name)) => format!(" (covering {name})"),
                    _ => String::new(),
                };
                writeln!(
                    out,
                    "    {} {} #{} {} {}min, {} attended{cover}",
                    log.date, log.start_time, log.class_id, log.title, log.duration_minutes, log.attendees
                )?;
            }
        }
        writeln!(out, "Total payout: {}", report.total_payout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use studio_core::{ClassDraft, ClassLifecycle, Difficulty};

    use super::super::testing::{output, Studio};
    use super::*;

    fn create_class(studio: &Studio, day: Weekday, start: &str) {
        let draft = ClassDraft {
            title: "Morning Flow".into(),
            description: String::new(),
            location: String::new(),
            difficulty: Difficulty::Beginner,
            day_of_week: day,
            start_time: start.parse().unwrap(),
            duration_minutes: 90,
            instructor_id: InstructorId::from("ana"),
            capacity: 8,
            points_cost: Decimal::ONE,
        };
        let owner = studio.session("owner");
        ClassLifecycle::new(&studio.db, &studio.clock, &studio.notifier)
            .create(&owner.principal, draft)
            .unwrap();
    }

    #[test]
    fn test_register_users_and_instructors() {
        let studio = Studio::new();
        let owner = studio.session("owner");

        let add = UserCmd::Add {
            id: "s1".into(),
            name: "Sam".into(),
            role: RoleArg::Student,
            phone: Some("0501234567".into()),
        };
        assert_eq!(output(|out| add.run(&owner, out)), "Registered s1 (STUDENT)\n");
        assert!(matches!(add.run(&owner, &mut Vec::new()), Err(AppError::Usage(_))));

        let rate = InstructorCmd::Add {
            id: "ana".into(),
            name: "Ana".into(),
            rate: Some(Decimal::from(120)),
            phone: None,
        };
        assert_eq!(output(|out| rate.run(&owner, out)), "Updated instructor ana\n");
        let ana = studio.db.find_instructor(&InstructorId::from("ana")).unwrap().unwrap();
        assert_eq!(ana.default_rate, Decimal::from(120));

        let s1 = studio.session("s1");
        let err = UserCmd::List.run(&s1, &mut Vec::new()).unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_settings_set_and_show() {
        let studio = Studio::new();
        let owner = studio.session("owner");

        let set = SettingsCmd::Set {
            days_before: Some(3),
            opens_at: Some("08:30".parse().unwrap()),
            prune_months: None,
            prune_batch: None,
            default_rate: None,
        };
        let text = output(|out| set.run(&owner, out));
        assert!(text.starts_with("booking window: 3 days before at 08:30\n"));

        let settings = studio.db.studio_settings().unwrap();
        assert_eq!(settings.booking_window.days_before, 3);
        assert_eq!(settings.prune_months_to_keep, 6);

        let bad = SettingsCmd::Set {
            days_before: None,
            opens_at: None,
            prune_months: None,
            prune_batch: Some(0),
            default_rate: None,
        };
        assert!(matches!(bad.run(&owner, &mut Vec::new()), Err(AppError::Usage(_))));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("ana=150").unwrap(), ("ana".to_string(), Decimal::from(150)));
        assert!(parse_rate("ana").is_err());
        assert!(parse_rate("ana=-5").is_err());
        assert!(parse_rate("=10").is_err());
    }

    #[test]
    fn test_payroll_with_rate_override() {
        let studio = Studio::new();
        create_class(&studio, Weekday::Mon, "08:00");
        let owner = studio.session("owner");

        let payroll = PayrollCmd {
            from: "2024-01-08".parse().unwrap(),
            to: "2024-01-21".parse().unwrap(),
            rates: vec![("ana".into(), Decimal::from(100))],
            sessions: true,
            json: false,
        };
        let text = output(|out| payroll.run(&owner, out));
        assert!(text.starts_with("Payroll 2024-01-08 to 2024-01-21\n"));
        assert!(text.contains("  2 classes   180 min"));
        assert!(text.contains("= 300\n"));
        assert!(text.contains("2024-01-15 08:00 #1 Morning Flow 90min, 0 attended"));
        assert!(text.ends_with("Total payout: 300\n"));
    }

    #[test]
    fn test_payroll_json_and_prune() {
        let studio = Studio::new();
        create_class(&studio, Weekday::Mon, "08:00");
        let owner = studio.session("owner");

        let payroll = PayrollCmd {
            from: "2024-01-08".parse().unwrap(),
            to: "2024-01-14".parse().unwrap(),
            rates: Vec::new(),
            sessions: false,
            json: true,
        };
        let text = output(|out| payroll.run(&owner, out));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["instructors"][0]["class_count"], 1);
        assert_eq!(value["instructors"][0]["sessions"][0]["kind"], "BASE");

        let prune = PruneCmd { months: Some(1) };
        let text = output(|out| prune.run(&owner, out));
        assert!(text.starts_with("Pruned history before 2023-12-08: 0 archived classes deleted"));
    }
}
