//! Studio Core Library
//!
//! Scheduling and booking core for a class studio: recurring class templates,
//! per-date rosters, credit balances, instructor payroll and the SQLite
//! storage they live in.

pub mod clock;
pub mod conflict;
pub mod error;
pub mod invariants;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod payroll;
pub mod permissions;
pub mod projector;
pub mod prune;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use conflict::{check_conflict, find_student_clash, Clash};
pub use error::{Error, ErrorKind, Result};
pub use ledger::{BookingLedger, BookingOutcome, BookingOverrides, CancelOutcome};
pub use lifecycle::{ClassLifecycle, DeleteOutcome, Refund, UpdateOutcome};
pub use models::*;
pub use notify::{LogNotifier, MemoryNotifier, Notifier, Recipient};
pub use payroll::{build_payroll, run_payroll, PayrollReport, SessionKind};
pub use permissions::*;
pub use projector::{
    next_occurrence_date, project, reconstruct_day, student_schedule, upcoming_board,
    BookingWindow, Occurrence,
};
pub use prune::{ArchivePruner, PruneReport};
pub use storage::{
    ClassFilter, ClassRepository, Database, InstructorRepository, SettingsRepository,
    Storage, StudioSettings, Subscription, UserRepository,
};
