//! Booking ledger: the only writer of rosters and credit balances
//!
//! Preconditions are checked up front against a snapshot, then membership,
//! overlaps, capacity and balance are re-checked inside one immediate
//! transaction so concurrent bookings from other connections cannot overfill
//! a class, double-book a student or overdraw a balance.

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::conflict::find_student_clash;
use crate::error::{Error, Result};
use crate::invariants::{assert_balance_non_negative, assert_roster_within_capacity};
use crate::models::{
    round_credits, weekday_label, ClassId, ClassTemplate, DateKey, MembershipType, User,
    UserId,
};
use crate::permissions::{Principal, StudioAction};
use crate::projector::BookingWindow;
use crate::storage::{ClassFilter, ClassStore, Database, SettingsRepository, UserStore};

/// Admin confirmations that waive a failed membership check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingOverrides {
    /// Book despite an expired unlimited membership
    pub membership: bool,
    /// Book without charge despite an insufficient balance
    pub credits: bool,
}

impl BookingOverrides {
    pub fn any(&self) -> bool {
        self.membership || self.credits
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Booked {
        charged: Decimal,
        /// Balance after the charge, for credit students
        balance: Option<Decimal>,
    },
    /// The student was already on the roster; nothing changed
    AlreadyBooked,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled {
        refunded: Decimal,
        balance: Option<Decimal>,
    },
    /// The student was not on the roster; nothing changed
    NotBooked,
}

/// How a booking is paid for, decided from the locked user record
#[derive(Debug, Clone, Copy)]
enum Billing {
    Free,
    Credits { cost: Decimal, comp_if_short: bool },
}

pub struct BookingLedger<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    window: BookingWindow,
}

impl<'a> BookingLedger<'a> {
    /// Ledger using the booking window from the stored studio settings
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Result<Self> {
        let window = db.studio_settings()?.booking_window;
        Ok(Self::with_window(db, clock, window))
    }

    pub fn with_window(db: &'a Database, clock: &'a dyn Clock, window: BookingWindow) -> Self {
        Self { db, clock, window }
    }

    /// Put `student_id` on the roster of `class_id` for `date`
    #[instrument(
        skip(self, actor, overrides),
        fields(actor = %actor.user_id, class_id = %class_id, student_id = %student_id, date = %date)
    )]
    pub fn book(
        &self,
        actor: &Principal,
        class_id: ClassId,
        student_id: &UserId,
        date: DateKey,
        overrides: BookingOverrides,
    ) -> Result<BookingOutcome> {
        actor.require_for(student_id, StudioAction::BookSelf, StudioAction::BookOthers)?;
        if overrides.any() {
            actor.require(StudioAction::OverrideMembership)?;
        }

        let template = self.load_class(class_id)?;
        let student = self.load_user(student_id)?;

        if template.archived {
            return Err(Error::InvalidOperation(format!(
                "class {class_id} is archived and cannot be booked"
            )));
        }
        if date.weekday() != template.day_of_week {
            return Err(Error::Validation(format!(
                "{date} is not a {}",
                weekday_label(template.day_of_week)
            )));
        }
        if template.roster_on(date).is_some_and(|r| r.contains(student_id)) {
            debug!("Student already on roster");
            return Ok(BookingOutcome::AlreadyBooked);
        }

        if !actor.can(StudioAction::BypassBookingWindow) {
            let now = self.clock.now();
            if self.window.is_too_early(now, date) {
                debug!(%now, "Booking window not open yet");
                return Err(Error::TooEarly {
                    opens_at: self.window.opens_for(date),
                });
            }
            if now >= date.at(template.start_time) {
                return Err(Error::AlreadyStarted);
            }
        }

        membership_billing(&student, &template, date, overrides)?;
        let active = self.db.classes().list(ClassFilter::Active)?;
        ensure_no_student_clash(&active, student_id, date, &template)?;

        // Snapshot checks repeated against the locked store
        let outcome = self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            let users = UserStore::new(conn);

            let roster = classes.roster(class_id, date)?;
            if roster.contains(student_id) {
                return Ok(BookingOutcome::AlreadyBooked);
            }

            let current = classes
                .find_by_id(class_id)?
                .ok_or_else(|| Error::NotFound(format!("class {class_id}")))?;
            if current.archived {
                return Err(Error::InvalidOperation(format!(
                    "class {class_id} was archived"
                )));
            }

            let user = users
                .find_by_id(student_id)?
                .ok_or_else(|| Error::NotFound(format!("user {student_id}")))?;
            let billing = membership_billing(&user, &current, date, overrides)?;
            let active = classes.list(ClassFilter::Active)?;
            ensure_no_student_clash(&active, student_id, date, &current)?;

            if roster.len() >= current.capacity as usize {
                return Err(Error::Full {
                    capacity: current.capacity,
                });
            }

            assert_roster_within_capacity(class_id, date, roster.len() + 1, current.capacity);
            match billing {
                Billing::Free => {
                    classes.add_booking(class_id, date, student_id, Decimal::ZERO)?;
                    Ok(BookingOutcome::Booked {
                        charged: Decimal::ZERO,
                        balance: None,
                    })
                }
                Billing::Credits { cost, comp_if_short } => {
                    let balance = round_credits(user.credits - cost);

                    if balance < Decimal::ZERO {
                        if !comp_if_short {
                            return Err(Error::InsufficientCredits {
                                required: cost,
                                available: user.credits,
                            });
                        }
                        classes.add_booking(class_id, date, student_id, Decimal::ZERO)?;
                        return Ok(BookingOutcome::Booked {
                            charged: Decimal::ZERO,
                            balance: Some(user.credits),
                        });
                    }

                    assert_balance_non_negative(student_id, balance);
                    classes.add_booking(class_id, date, student_id, cost)?;
                    users.set_credits(student_id, balance)?;
                    Ok(BookingOutcome::Booked {
                        charged: cost,
                        balance: Some(balance),
                    })
                }
            }
        })?;

        match &outcome {
            BookingOutcome::Booked { charged, balance } => {
                info!(%charged, balance = ?balance, "Booking committed");
                self.db.publish_classes()?;
            }
            BookingOutcome::AlreadyBooked => debug!("Student already on roster"),
        }
        Ok(outcome)
    }

    /// Take `student_id` off the roster and refund what they were charged
    #[instrument(
        skip(self, actor),
        fields(actor = %actor.user_id, class_id = %class_id, student_id = %student_id, date = %date)
    )]
    pub fn cancel(
        &self,
        actor: &Principal,
        class_id: ClassId,
        student_id: &UserId,
        date: DateKey,
    ) -> Result<CancelOutcome> {
        actor.require_for(student_id, StudioAction::CancelSelf, StudioAction::CancelOthers)?;
        let template = self.load_class(class_id)?;

        if !actor.can(StudioAction::CancelStartedClass)
            && self.clock.now() >= date.at(template.start_time)
        {
            return Err(Error::AlreadyStarted);
        }

        let outcome = self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            let users = UserStore::new(conn);

            let Some(charged) = classes.remove_booking(class_id, date, student_id)? else {
                return Ok(CancelOutcome::NotBooked);
            };

            if charged.is_zero() {
                return Ok(CancelOutcome::Cancelled {
                    refunded: Decimal::ZERO,
                    balance: None,
                });
            }

            match users.find_by_id(student_id)? {
                Some(user) => {
                    let balance = round_credits(user.credits + charged);
                    users.set_credits(student_id, balance)?;
                    Ok(CancelOutcome::Cancelled {
                        refunded: charged,
                        balance: Some(balance),
                    })
                }
                None => {
                    warn!("Cancelled booking belongs to an unknown user, nothing refunded");
                    Ok(CancelOutcome::Cancelled {
                        refunded: Decimal::ZERO,
                        balance: None,
                    })
                }
            }
        })?;

        match &outcome {
            CancelOutcome::Cancelled { refunded, .. } => {
                info!(%refunded, "Cancellation committed");
                self.db.publish_classes()?;
            }
            CancelOutcome::NotBooked => debug!("Student was not on roster"),
        }
        Ok(outcome)
    }

    /// Top up or correct a credit balance; returns the new balance
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, student_id = %student_id))]
    pub fn adjust_credits(
        &self,
        actor: &Principal,
        student_id: &UserId,
        delta: Decimal,
    ) -> Result<Decimal> {
        actor.require(StudioAction::AdjustCredits)?;

        let balance = self.db.transaction(|conn| {
            let users = UserStore::new(conn);
            let user = users
                .find_by_id(student_id)?
                .ok_or_else(|| Error::NotFound(format!("user {student_id}")))?;

            let balance = user
                .credits
                .checked_add(delta)
                .map(round_credits)
                .ok_or_else(|| Error::Validation(format!("adjustment of {delta} is out of range")))?;
            if balance < Decimal::ZERO {
                return Err(Error::Validation(format!(
                    "adjustment of {delta} would leave a negative balance ({balance})"
                )));
            }
            users.set_credits(student_id, balance)?;
            Ok(balance)
        })?;

        info!(%delta, %balance, "Credits adjusted");
        Ok(balance)
    }

    /// Switch a student's membership plan
    ///
    /// Unlimited plans need an expiry date; credit plans drop it.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, student_id = %student_id))]
    pub fn set_membership(
        &self,
        actor: &Principal,
        student_id: &UserId,
        membership: MembershipType,
        unlimited_expiry: Option<DateKey>,
    ) -> Result<()> {
        actor.require(StudioAction::AssignMembership)?;

        let expiry = match membership {
            MembershipType::Unlimited => Some(unlimited_expiry.ok_or_else(|| {
                Error::Validation("unlimited membership needs an expiry date".into())
            })?),
            MembershipType::Credit => None,
        };

        self.db.transaction(|conn| {
            let users = UserStore::new(conn);
            if users.find_by_id(student_id)?.is_none() {
                return Err(Error::NotFound(format!("user {student_id}")));
            }
            users.set_membership(student_id, membership, expiry)
        })?;

        info!(membership = membership.as_str(), expiry = ?expiry, "Membership updated");
        Ok(())
    }

    /// Drop roster entries that no longer resolve to a user
    ///
    /// Returns the removed ids. This is the only wholesale roster rewrite.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, class_id = %class_id, date = %date))]
    pub fn repair_roster(
        &self,
        actor: &Principal,
        class_id: ClassId,
        date: DateKey,
    ) -> Result<Vec<UserId>> {
        actor.require(StudioAction::RepairRoster)?;
        self.load_class(class_id)?;

        let ghosts = self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            let users = UserStore::new(conn);

            let mut keep = Vec::new();
            let mut ghosts = Vec::new();
            for student in classes.roster(class_id, date)?.iter() {
                if users.find_by_id(student)?.is_some() {
                    keep.push(student.clone());
                } else {
                    ghosts.push(student.clone());
                }
            }

            if !ghosts.is_empty() {
                classes.retain_roster(class_id, date, &keep)?;
            }
            Ok(ghosts)
        })?;

        if !ghosts.is_empty() {
            warn!(removed = ghosts.len(), ghosts = ?ghosts, "Ghost roster entries removed");
            self.db.publish_classes()?;
        }
        Ok(ghosts)
    }

    fn load_class(&self, class_id: ClassId) -> Result<ClassTemplate> {
        self.db
            .classes()
            .find_by_id(class_id)?
            .ok_or_else(|| Error::NotFound(format!("class {class_id}")))
    }

    fn load_user(&self, user_id: &UserId) -> Result<User> {
        self.db
            .users()
            .find_by_id(user_id)?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }
}

fn ensure_no_student_clash(
    active: &[ClassTemplate],
    student_id: &UserId,
    date: DateKey,
    template: &ClassTemplate,
) -> Result<()> {
    match find_student_clash(active, student_id, date, template) {
        Some(clash) => {
            debug!(title = %clash.title, "Student already booked into an overlapping class");
            Err(Error::TimeConflict {
                title: clash.title,
                start_time: clash.start_time,
            })
        }
        None => Ok(()),
    }
}

/// Membership check for the booked user; only students are billed
fn membership_billing(
    student: &User,
    template: &ClassTemplate,
    date: DateKey,
    overrides: BookingOverrides,
) -> Result<Billing> {
    if !student.is_student() {
        return Ok(Billing::Free);
    }

    match student.membership {
        MembershipType::Unlimited => {
            if student.unlimited_covers(date) || overrides.membership {
                Ok(Billing::Free)
            } else {
                Err(Error::MembershipInvalid(match student.unlimited_expiry {
                    Some(expiry) => format!("unlimited membership expired on {expiry}"),
                    None => "unlimited membership has no expiry date".to_string(),
                }))
            }
        }
        MembershipType::Credit => {
            let cost = template.points_cost;
            if student.credits < cost && !overrides.credits {
                return Err(Error::InsufficientCredits {
                    required: cost,
                    available: student.credits,
                });
            }
            Ok(Billing::Credits {
                cost,
                comp_if_short: overrides.credits,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use chrono::{NaiveDateTime, Weekday};

    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{ClassDraft, Difficulty, InstructorId, Role};
    use crate::storage::UserRepository;
    use crate::error::ErrorKind;

    fn key(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    // 2024-01-10 is a Wednesday
    const NEXT_WED: &str = "2024-01-10";

    fn wednesday_class(db: &Database, id: u32, start: &str, capacity: u32, cost: Decimal) {
        let draft = ClassDraft {
            title: format!("Class {id}"),
            description: String::new(),
            location: "Studio A".into(),
            difficulty: Difficulty::Beginner,
            day_of_week: Weekday::Wed,
            start_time: start.parse().unwrap(),
            duration_minutes: 60,
            instructor_id: InstructorId::from("ana"),
            capacity,
            points_cost: cost,
        };
        db.classes()
            .create(&ClassTemplate::from_draft(ClassId(id), draft, key("2024-01-01")))
            .unwrap();
    }

    fn student(db: &Database, id: &str, credits: Decimal) -> Principal {
        let mut user = User::new(UserId::from(id), id.to_uppercase(), Role::Student);
        user.credits = credits;
        db.create_user(&user).unwrap();
        Principal::new(user.id, Role::Student)
    }

    fn admin(db: &Database) -> Principal {
        let user = User::new(UserId::from("boss"), "Boss".into(), Role::Admin);
        db.create_user(&user).unwrap();
        Principal::new(user.id, Role::Admin)
    }

    fn credits(db: &Database, id: &str) -> Decimal {
        db.find_user(&UserId::from(id)).unwrap().unwrap().credits
    }

    fn monday_morning() -> FixedClock {
        FixedClock::new(at("2024-01-08 12:00:00"))
    }

    #[test]
    fn test_wednesday_scenario() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 2, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::ONE);
        let s2 = student(&db, "s2", Decimal::ZERO);
        let date = key(NEXT_WED);

        let outcome = ledger
            .book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default())
            .unwrap();
        assert_eq!(
            outcome,
            BookingOutcome::Booked { charged: Decimal::ONE, balance: Some(Decimal::ZERO) }
        );
        assert_eq!(credits(&db, "s1"), Decimal::ZERO);

        let err = ledger
            .book(&s2, ClassId(1), &s2.user_id, date, BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientCredits);
        assert!(err.suggests_top_up());

        ledger.cancel(&s1, ClassId(1), &s1.user_id, date).unwrap();
        assert_eq!(credits(&db, "s1"), Decimal::ONE);
        assert!(db.classes().roster(ClassId(1), date).unwrap().is_empty());
    }

    #[test]
    fn test_rebooking_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(3));
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        let again = ledger
            .book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default())
            .unwrap();
        assert_eq!(again, BookingOutcome::AlreadyBooked);
        assert_eq!(credits(&db, "s1"), Decimal::from(2));
        assert_eq!(db.classes().roster(ClassId(1), date).unwrap().len(), 1);
    }

    #[test]
    fn test_book_then_cancel_is_exact_inverse() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::new(4, 1));
        let s1 = student(&db, "s1", Decimal::new(12, 1));
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        assert_eq!(credits(&db, "s1"), Decimal::new(8, 1));

        let outcome = ledger.cancel(&s1, ClassId(1), &s1.user_id, date).unwrap();
        assert_eq!(
            outcome,
            CancelOutcome::Cancelled {
                refunded: Decimal::new(4, 1),
                balance: Some(Decimal::new(12, 1)),
            }
        );
        assert_eq!(credits(&db, "s1").to_string(), "1.2");

        let again = ledger.cancel(&s1, ClassId(1), &s1.user_id, date).unwrap();
        assert_eq!(again, CancelOutcome::NotBooked);
        assert_eq!(credits(&db, "s1").to_string(), "1.2");
    }

    #[test]
    fn test_cancel_refunds_recorded_charge_after_price_change() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(2));
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        let mut template = db.classes().find_by_id(ClassId(1)).unwrap().unwrap();
        template.points_cost = Decimal::from(5);
        db.classes().update(&template).unwrap();

        ledger.cancel(&s1, ClassId(1), &s1.user_id, date).unwrap();
        assert_eq!(credits(&db, "s1"), Decimal::from(2));
    }

    #[test]
    fn test_booking_window_boundary() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(at("2024-01-07 23:00:00"));
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(2));
        let date = key(NEXT_WED);

        let err = ledger
            .book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default())
            .unwrap_err();
        match err {
            Error::TooEarly { opens_at } => assert_eq!(opens_at, at("2024-01-08 09:00:00")),
            other => panic!("expected TooEarly, got {other:?}"),
        }

        clock.set(at("2024-01-08 09:00:01"));
        assert!(ledger
            .book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default())
            .is_ok());
    }

    #[test]
    fn test_admin_bypasses_window_and_books_others() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(at("2024-01-01 08:00:00"));
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(2));
        let s2 = student(&db, "s2", Decimal::from(2));
        let boss = admin(&db);
        let date = key(NEXT_WED);

        let err = ledger
            .book(&s1, ClassId(1), &s2.user_id, date, BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        ledger.book(&boss, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        assert_eq!(credits(&db, "s1"), Decimal::ONE);
    }

    #[test]
    fn test_started_class_cannot_be_booked_or_cancelled_by_student() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(2));
        let boss = admin(&db);
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        clock.set(at("2024-01-10 10:00:00"));

        let err = ledger.cancel(&s1, ClassId(1), &s1.user_id, date).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyStarted);
        let s2 = student(&db, "s2", Decimal::from(2));
        let err = ledger
            .book(&s2, ClassId(1), &s2.user_id, date, BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyStarted);

        ledger.cancel(&boss, ClassId(1), &s1.user_id, date).unwrap();
        assert_eq!(credits(&db, "s1"), Decimal::from(2));
    }

    #[test]
    fn test_unlimited_membership_rules() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::ZERO);
        let boss = admin(&db);
        let date = key(NEXT_WED);

        ledger
            .set_membership(&boss, &s1.user_id, MembershipType::Unlimited, Some(key("2024-01-09")))
            .unwrap();
        let err = ledger
            .book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MembershipInvalid);

        // Students cannot waive the check themselves
        let waive = BookingOverrides { membership: true, credits: false };
        let err = ledger.book(&s1, ClassId(1), &s1.user_id, date, waive).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        ledger.book(&boss, ClassId(1), &s1.user_id, date, waive).unwrap();

        ledger
            .set_membership(&boss, &s1.user_id, MembershipType::Unlimited, Some(key("2024-01-10")))
            .unwrap();
        wednesday_class(&db, 2, "18:00", 5, Decimal::ONE);
        let outcome = ledger
            .book(&s1, ClassId(2), &s1.user_id, date, BookingOverrides::default())
            .unwrap();
        assert_eq!(outcome, BookingOutcome::Booked { charged: Decimal::ZERO, balance: None });
        assert_eq!(credits(&db, "s1"), Decimal::ZERO);
    }

    #[test]
    fn test_admin_credit_override_books_without_charge() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::from(2));
        let s1 = student(&db, "s1", Decimal::new(5, 1));
        let boss = admin(&db);
        let date = key(NEXT_WED);

        let comp = BookingOverrides { membership: false, credits: true };
        let outcome = ledger.book(&boss, ClassId(1), &s1.user_id, date, comp).unwrap();
        assert_eq!(
            outcome,
            BookingOutcome::Booked { charged: Decimal::ZERO, balance: Some(Decimal::new(5, 1)) }
        );

        ledger.cancel(&boss, ClassId(1), &s1.user_id, date).unwrap();
        assert_eq!(credits(&db, "s1"), Decimal::new(5, 1));
    }

    #[test]
    fn test_overlapping_booking_is_time_conflict() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        wednesday_class(&db, 2, "10:30", 5, Decimal::ONE);
        wednesday_class(&db, 3, "11:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(5));
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        let err = ledger
            .book(&s1, ClassId(2), &s1.user_id, date, BookingOverrides::default())
            .unwrap_err();
        match err {
            Error::TimeConflict { title, start_time } => {
                assert_eq!(title, "Class 1");
                assert_eq!(start_time.to_string(), "10:00");
            }
            other => panic!("expected TimeConflict, got {other:?}"),
        }
        // Back-to-back is fine
        ledger.book(&s1, ClassId(3), &s1.user_id, date, BookingOverrides::default()).unwrap();
    }

    #[test]
    fn test_full_class_and_invalid_targets() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 1, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(5));
        let s2 = student(&db, "s2", Decimal::from(5));
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        let err = ledger
            .book(&s2, ClassId(1), &s2.user_id, date, BookingOverrides::default())
            .unwrap_err();
        assert!(matches!(err, Error::Full { capacity: 1 }));
        assert_eq!(credits(&db, "s2"), Decimal::from(5));

        let err = ledger
            .book(&s2, ClassId(1), &s2.user_id, key("2024-01-11"), BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ledger
            .book(&s2, ClassId(9), &s2.user_id, date, BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        db.classes().archive(ClassId(1), key("2024-01-08")).unwrap();
        let err = ledger
            .book(&s2, ClassId(1), &s2.user_id, key("2024-01-17"), BookingOverrides::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_adjust_credits_keeps_balance_non_negative() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        let s1 = student(&db, "s1", Decimal::ONE);
        let boss = admin(&db);

        let balance = ledger.adjust_credits(&boss, &s1.user_id, Decimal::new(2505, 3)).unwrap();
        assert_eq!(balance.to_string(), "3.51");

        let err = ledger.adjust_credits(&boss, &s1.user_id, Decimal::from(-10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(credits(&db, "s1").to_string(), "3.51");

        let err = ledger.adjust_credits(&boss, &s1.user_id, Decimal::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(credits(&db, "s1").to_string(), "3.51");

        let err = ledger.adjust_credits(&s1, &s1.user_id, Decimal::ONE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_repair_roster_removes_only_ghosts() {
        let db = Database::open_in_memory().unwrap();
        let clock = monday_morning();
        let ledger = BookingLedger::new(&db, &clock).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(2));
        let s2 = student(&db, "s2", Decimal::from(2));
        let boss = admin(&db);
        let date = key(NEXT_WED);

        ledger.book(&s1, ClassId(1), &s1.user_id, date, BookingOverrides::default()).unwrap();
        ledger.book(&s2, ClassId(1), &s2.user_id, date, BookingOverrides::default()).unwrap();
        db.delete_user(&s1.user_id).unwrap();

        let removed = ledger.repair_roster(&boss, ClassId(1), date).unwrap();
        assert_eq!(removed, vec![UserId::from("s1")]);
        assert_eq!(
            db.classes().roster(ClassId(1), date).unwrap().as_slice(),
            &[UserId::from("s2")]
        );
        assert!(ledger.repair_roster(&boss, ClassId(1), date).unwrap().is_empty());
    }

    #[test]
    fn test_capacity_holds_under_concurrent_bookings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.db");
        const CAPACITY: u32 = 3;
        const STUDENTS: usize = 8;

        {
            let db = Database::open(&path).unwrap();
            wednesday_class(&db, 1, "10:00", CAPACITY, Decimal::ONE);
            for i in 0..STUDENTS {
                student(&db, &format!("s{i}"), Decimal::ONE);
            }
        }

        let handles: Vec<_> = (0..STUDENTS)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    let clock = monday_morning();
                    let ledger = BookingLedger::new(&db, &clock).unwrap();
                    let me = Principal::new(UserId::new(format!("s{i}")), Role::Student);
                    ledger.book(&me, ClassId(1), &me.user_id, key(NEXT_WED), BookingOverrides::default())
                })
            })
            .collect();

        let results: Vec<Result<BookingOutcome>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let booked = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(booked, CAPACITY as usize);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err.kind(), ErrorKind::Full | ErrorKind::TransactionAborted),
                "unexpected failure: {err}"
            );
        }

        let db = Database::open(&path).unwrap();
        let roster = db.classes().roster(ClassId(1), key(NEXT_WED)).unwrap();
        assert_eq!(roster.len(), CAPACITY as usize);
        let charged: usize = db
            .list_users()
            .unwrap()
            .iter()
            .filter(|u| u.credits.is_zero())
            .count();
        assert_eq!(charged, CAPACITY as usize);
    }

    /// Runs `hook` the first time the ledger reads the time
    struct InterleavedClock {
        inner: FixedClock,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl Clock for InterleavedClock {
        fn now(&self) -> NaiveDateTime {
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
            self.inner.now()
        }
    }

    #[test]
    fn test_billing_follows_membership_committed_mid_booking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.db");
        let db = Database::open(&path).unwrap();
        wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
        let s1 = student(&db, "s1", Decimal::from(5));

        let other = path.clone();
        let clock = InterleavedClock {
            inner: monday_morning(),
            hook: Mutex::new(Some(Box::new(move || {
                let db = Database::open(&other).unwrap();
                db.users()
                    .set_membership(
                        &UserId::from("s1"),
                        MembershipType::Unlimited,
                        Some(key("2024-12-31")),
                    )
                    .unwrap();
            }))),
        };
        let ledger = BookingLedger::new(&db, &clock).unwrap();

        let outcome = ledger
            .book(&s1, ClassId(1), &s1.user_id, key(NEXT_WED), BookingOverrides::default())
            .unwrap();
        assert_eq!(
            outcome,
            BookingOutcome::Booked { charged: Decimal::ZERO, balance: None }
        );
        assert_eq!(credits(&db, "s1"), Decimal::from(5));
    }

    #[test]
    fn test_student_clash_holds_under_concurrent_bookings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.db");
        let dates: Vec<DateKey> = (0..6).map(|week| key(NEXT_WED).add_days(7 * week)).collect();

        {
            let db = Database::open(&path).unwrap();
            wednesday_class(&db, 1, "10:00", 5, Decimal::ONE);
            wednesday_class(&db, 2, "10:30", 5, Decimal::ONE);
            student(&db, "s1", Decimal::from(20));
            admin(&db);
        }

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [ClassId(1), ClassId(2)]
            .into_iter()
            .map(|class_id| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                let dates = dates.clone();
                thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    let clock = monday_morning();
                    let ledger = BookingLedger::new(&db, &clock).unwrap();
                    let boss = Principal::new(UserId::from("boss"), Role::Admin);
                    dates
                        .iter()
                        .map(|date| {
                            barrier.wait();
                            ledger.book(
                                &boss,
                                class_id,
                                &UserId::from("s1"),
                                *date,
                                BookingOverrides::default(),
                            )
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Result<BookingOutcome>> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err.kind(), ErrorKind::TimeConflict | ErrorKind::TransactionAborted),
                "unexpected failure: {err}"
            );
        }

        let db = Database::open(&path).unwrap();
        let mut booked = 0;
        for date in &dates {
            let on_date = db.classes().roster(ClassId(1), *date).unwrap().len()
                + db.classes().roster(ClassId(2), *date).unwrap().len();
            assert!(on_date <= 1, "double booked on {date}");
            booked += on_date;
        }
        assert_eq!(credits(&db, "s1"), Decimal::from(20 - booked as i64));
    }
}
