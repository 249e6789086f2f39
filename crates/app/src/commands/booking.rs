//! Booking, cancellation and balance commands

use std::io::Write;

use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use studio_core::{
    BookingLedger, BookingOutcome, BookingOverrides, CancelOutcome, ClassId, DateKey,
    MembershipType, UserId,
};

use super::Session;
use crate::error::AppResult;

fn target(session: &Session<'_>, student: &Option<String>) -> UserId {
    match student {
        Some(id) => UserId::new(id.as_str()),
        None => session.principal.user_id.clone(),
    }
}

#[derive(Args)]
pub struct BookCmd {
    /// Class number
    #[arg(long)]
    pub class: u32,

    /// Occurrence date (YYYY-MM-DD)
    #[arg(long)]
    pub date: DateKey,

    /// Student to book (default: the acting user)
    #[arg(long)]
    pub student: Option<String>,

    /// Book despite an expired unlimited membership
    #[arg(long)]
    pub comp_membership: bool,

    /// Book without charge despite an insufficient balance
    #[arg(long)]
    pub comp_credits: bool,
}

impl BookCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let ledger = BookingLedger::new(session.db, session.clock)?;
        let student = target(session, &self.student);
        let overrides = BookingOverrides {
            membership: self.comp_membership,
            credits: self.comp_credits,
        };

        match ledger.book(&session.principal, ClassId(self.class), &student, self.date, overrides)? {
            BookingOutcome::Booked { charged, balance } => {
                write!(out, "Booked {student} into #{} on {}", self.class, self.date)?;
                match balance {
                    Some(balance) => writeln!(out, " ({charged} credits, balance {balance})")?,
                    None => writeln!(out)?,
                }
            }
            BookingOutcome::AlreadyBooked => {
                writeln!(out, "{student} is already booked into #{} on {}", self.class, self.date)?
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct CancelCmd {
    /// Class number
    #[arg(long)]
    pub class: u32,

    /// Occurrence date (YYYY-MM-DD)
    #[arg(long)]
    pub date: DateKey,

    /// Student to cancel (default: the acting user)
    #[arg(long)]
    pub student: Option<String>,
}

impl CancelCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let ledger = BookingLedger::new(session.db, session.clock)?;
        let student = target(session, &self.student);

        match ledger.cancel(&session.principal, ClassId(self.class), &student, self.date)? {
            CancelOutcome::Cancelled { refunded, balance } => {
                write!(out, "Cancelled {student} from #{} on {}", self.class, self.date)?;
                match balance {
                    Some(balance) => writeln!(out, " ({refunded} refunded, balance {balance})")?,
                    None => writeln!(out)?,
                }
            }
            CancelOutcome::NotBooked => {
                writeln!(out, "{student} was not booked into #{} on {}", self.class, self.date)?
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct CreditsCmd {
    #[arg(long)]
    pub student: String,

    /// Amount to add; negative to correct downwards
    #[arg(long, allow_negative_numbers = true)]
    pub delta: Decimal,
}

impl CreditsCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let ledger = BookingLedger::new(session.db, session.clock)?;
        let student = UserId::new(self.student.as_str());
        let balance = ledger.adjust_credits(&session.principal, &student, self.delta)?;
        writeln!(out, "{student} now has {balance} credits")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Plan {
    Credit,
    Unlimited,
}

impl From<Plan> for MembershipType {
    fn from(plan: Plan) -> Self {
        match plan {
            Plan::Credit => MembershipType::Credit,
            Plan::Unlimited => MembershipType::Unlimited,
        }
    }
}

#[derive(Args)]
pub struct MembershipCmd {
    #[arg(long)]
    pub student: String,

    #[arg(long, value_enum)]
    pub plan: Plan,

    /// Last day covered by an unlimited plan
    #[arg(long)]
    pub expires: Option<DateKey>,
}

impl MembershipCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let ledger = BookingLedger::new(session.db, session.clock)?;
        let student = UserId::new(self.student.as_str());
        let plan = MembershipType::from(self.plan);
        ledger.set_membership(&session.principal, &student, plan, self.expires)?;

        match self.expires.filter(|_| plan == MembershipType::Unlimited) {
            Some(expiry) => writeln!(out, "{student} is on {} until {expiry}", plan.as_str())?,
            None => writeln!(out, "{student} is on {}", plan.as_str())?,
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct RepairCmd {
    #[arg(long)]
    pub class: u32,

    #[arg(long)]
    pub date: DateKey,
}

impl RepairCmd {
    pub fn run(&self, session: &Session<'_>, out: &mut dyn Write) -> AppResult<()> {
        let ledger = BookingLedger::new(session.db, session.clock)?;
        let removed = ledger.repair_roster(&session.principal, ClassId(self.class), self.date)?;

        if removed.is_empty() {
            writeln!(out, "Roster of #{} on {} is clean", self.class, self.date)?;
        } else {
            let ids: Vec<&str> = removed.iter().map(|id| id.as_str()).collect();
            writeln!(out, "Removed {} ghost entries: {}", removed.len(), ids.join(", "))?;
        }
        Ok(())
    }
}
