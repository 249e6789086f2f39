//! Class lifecycle: create, edit, fork, substitute and delete templates
//!
//! Templates are never hard-deleted here. Deleting archives the template and
//! refunds every booking from today on. Changing the base instructor forks the
//! template so past occurrences keep crediting the instructor who taught them.

use std::collections::BTreeMap;

use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::conflict::check_conflict;
use crate::error::{Error, Result};
use crate::invariants::assert_template_invariants;
use crate::models::{
    round_credits, weekday_label, ClassDraft, ClassId, ClassTemplate, DateKey, InstructorId,
    UserId,
};
use crate::notify::{Notifier, Recipient};
use crate::permissions::{Principal, StudioAction};
use crate::storage::{ClassFilter, ClassStore, Database, UserStore};

/// Credits returned to one student when their bookings were dropped
#[derive(Debug, Clone, PartialEq)]
pub struct Refund {
    pub student_id: UserId,
    pub amount: Decimal,
    pub dates: Vec<DateKey>,
}

#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// Edited in place
    Updated(ClassTemplate),
    /// Base instructor changed: the old version was archived and replaced
    Forked {
        archived: ClassId,
        successor: ClassTemplate,
        refunds: Vec<Refund>,
        notified: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// No bookings from today on; archived straight away
    Archived,
    /// Future bookings were refunded before archiving
    Refunded { refunds: Vec<Refund>, notified: bool },
}

pub struct ClassLifecycle<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
}

impl<'a> ClassLifecycle<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock, notifier: &'a dyn Notifier) -> Self {
        Self {
            db,
            clock,
            notifier,
        }
    }

    /// Create a new weekly template
    #[instrument(skip(self, actor, draft), fields(actor = %actor.user_id, title = %draft.title))]
    pub fn create(&self, actor: &Principal, draft: ClassDraft) -> Result<ClassTemplate> {
        actor.require(StudioAction::ManageClasses)?;
        draft.validate()?;
        self.require_instructor(&draft.instructor_id)?;
        let today = self.clock.today();

        let template = self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            ensure_instructor_free(&classes, &draft, None)?;

            let template = ClassTemplate::from_draft(classes.next_id()?, draft.clone(), today);
            assert_template_invariants(&template);
            classes.create(&template)?;
            Ok(template)
        })?;

        info!(class_id = %template.id, "Class created");
        self.db.publish_classes()?;
        Ok(template)
    }

    /// Apply an edit; a new base instructor forks the template
    #[instrument(skip(self, actor, draft), fields(actor = %actor.user_id, class_id = %id))]
    pub fn update(&self, actor: &Principal, id: ClassId, draft: ClassDraft) -> Result<UpdateOutcome> {
        actor.require(StudioAction::ManageClasses)?;
        draft.validate()?;
        let current = self.load_active(id)?;
        self.require_instructor(&draft.instructor_id)?;
        let today = self.clock.today();

        if draft.instructor_id == current.instructor_id {
            let updated = self.db.transaction(|conn| {
                let classes = ClassStore::new(conn);
                ensure_instructor_free(&classes, &draft, Some(id))?;
                ensure_bookings_fit(&classes, &current, &draft, today)?;

                let mut template = current.clone();
                template.apply_draft(draft.clone());
                assert_template_invariants(&template);
                classes.update(&template)?;
                Ok(template)
            })?;

            info!("Class updated in place");
            self.db.publish_classes()?;
            return Ok(UpdateOutcome::Updated(updated));
        }

        let (successor, refunds) = self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            ensure_instructor_free(&classes, &draft, Some(id))?;

            let refunds = refund_bookings_from(conn, id, today)?;
            classes.archive(id, today.sub_days(1))?;

            let successor = ClassTemplate::from_draft(classes.next_id()?, draft.clone(), today);
            assert_template_invariants(&successor);
            classes.create(&successor)?;
            Ok((successor, refunds))
        })?;

        info!(
            successor = %successor.id,
            from = %current.instructor_id,
            to = %successor.instructor_id,
            "Class forked on instructor change"
        );
        self.db.publish_classes()?;

        let notified = self.notify_refunds(
            &refunds,
            &format!(
                "{} on {} at {} has a new instructor. Your upcoming bookings were cancelled and refunded, please book again.",
                current.title,
                weekday_label(current.day_of_week),
                current.start_time
            ),
        );

        Ok(UpdateOutcome::Forked {
            archived: id,
            successor,
            refunds,
            notified,
        })
    }

    /// Put a substitute instructor on one occurrence
    ///
    /// Assigning the base instructor removes any substitution for that date.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, class_id = %id, date = %date))]
    pub fn assign_substitute(
        &self,
        actor: &Principal,
        id: ClassId,
        date: DateKey,
        instructor: &InstructorId,
    ) -> Result<()> {
        actor.require(StudioAction::ManageSubstitutions)?;
        let template = self.load_active(id)?;
        if date.weekday() != template.day_of_week {
            return Err(Error::Validation(format!(
                "{date} is not a {}",
                weekday_label(template.day_of_week)
            )));
        }
        self.require_instructor(instructor)?;

        if *instructor == template.instructor_id {
            debug!("Substitute is the base instructor, clearing instead");
            self.clear_substitute(actor, id, date)?;
            return Ok(());
        }

        self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            let active = classes.list(ClassFilter::Active)?;
            if let Some(clash) = check_conflict(
                &active,
                instructor,
                template.day_of_week,
                template.start_time,
                template.duration_minutes,
                Some(id),
                Some(date),
            ) {
                return Err(Error::InstructorConflict {
                    title: clash.title,
                    start_time: clash.start_time,
                });
            }
            classes.set_substitution(id, date, instructor)
        })?;

        info!(substitute = %instructor, "Substitute assigned");
        self.db.publish_classes()
    }

    /// Remove the substitution for one date; returns whether one existed
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, class_id = %id, date = %date))]
    pub fn clear_substitute(&self, actor: &Principal, id: ClassId, date: DateKey) -> Result<bool> {
        actor.require(StudioAction::ManageSubstitutions)?;
        let removed = self
            .db
            .transaction(|conn| ClassStore::new(conn).clear_substitution(id, date))?;

        if removed {
            info!("Substitution cleared");
            self.db.publish_classes()?;
        }
        Ok(removed)
    }

    /// Archive a template, refunding bookings from today on
    #[instrument(skip(self, actor), fields(actor = %actor.user_id, class_id = %id))]
    pub fn delete(&self, actor: &Principal, id: ClassId) -> Result<DeleteOutcome> {
        actor.require(StudioAction::ManageClasses)?;
        let template = self.load_active(id)?;
        let today = self.clock.today();

        let refunds = self.db.transaction(|conn| {
            let classes = ClassStore::new(conn);
            let refunds = if classes.charges_from(id, today)?.is_empty() {
                None
            } else {
                Some(refund_bookings_from(conn, id, today)?)
            };
            classes.archive(id, today)?;
            Ok(refunds)
        })?;
        self.db.publish_classes()?;

        let Some(refunds) = refunds else {
            info!("Class archived");
            return Ok(DeleteOutcome::Archived);
        };

        info!(students = refunds.len(), "Class archived with refunds");
        let notified = self.notify_refunds(
            &refunds,
            &format!(
                "{} on {} at {} has been cancelled. Your credits have been refunded.",
                template.title,
                weekday_label(template.day_of_week),
                template.start_time
            ),
        );
        Ok(DeleteOutcome::Refunded { refunds, notified })
    }

    fn load_active(&self, id: ClassId) -> Result<ClassTemplate> {
        let template = self
            .db
            .classes()
            .find_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("class {id}")))?;
        if template.archived {
            return Err(Error::InvalidOperation(format!("class {id} is archived")));
        }
        Ok(template)
    }

    fn require_instructor(&self, id: &InstructorId) -> Result<()> {
        match self.db.instructors().find_by_id(id)? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("instructor {id}"))),
        }
    }

    /// Tell refunded students what happened; failures are logged, not returned
    fn notify_refunds(&self, refunds: &[Refund], message: &str) -> bool {
        let users = self.db.users();
        let mut recipients = Vec::new();
        for refund in refunds {
            match users.find_by_id(&refund.student_id) {
                Ok(Some(user)) => recipients.push(Recipient {
                    name: user.name,
                    phone: user.phone,
                }),
                Ok(None) => warn!(student_id = %refund.student_id, "Refunded student no longer exists"),
                Err(e) => warn!(student_id = %refund.student_id, error = %e, "Could not load refunded student"),
            }
        }
        if recipients.is_empty() {
            return false;
        }

        match self.notifier.dispatch(message, &recipients) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Refund notification failed");
                false
            }
        }
    }
}

fn ensure_instructor_free(
    classes: &ClassStore<'_>,
    draft: &ClassDraft,
    exclude: Option<ClassId>,
) -> Result<()> {
    let active = classes.list(ClassFilter::Active)?;
    match check_conflict(
        &active,
        &draft.instructor_id,
        draft.day_of_week,
        draft.start_time,
        draft.duration_minutes,
        exclude,
        None,
    ) {
        Some(clash) => Err(Error::InstructorConflict {
            title: clash.title,
            start_time: clash.start_time,
        }),
        None => Ok(()),
    }
}

/// Upcoming rosters must still be valid after an in-place edit
///
/// A booking stays on the weekday it was made for, so moving a class with
/// upcoming bookings would strand them off the board.
fn ensure_bookings_fit(
    classes: &ClassStore<'_>,
    current: &ClassTemplate,
    draft: &ClassDraft,
    today: DateKey,
) -> Result<()> {
    let upcoming = classes.charges_from(current.id, today)?;
    if upcoming.is_empty() {
        return Ok(());
    }
    if draft.day_of_week != current.day_of_week {
        return Err(Error::Validation(format!(
            "class {} has upcoming bookings and cannot move from {} to {}",
            current.id,
            weekday_label(current.day_of_week),
            weekday_label(draft.day_of_week)
        )));
    }

    let mut per_date: BTreeMap<DateKey, usize> = BTreeMap::new();
    for charge in &upcoming {
        *per_date.entry(charge.date).or_default() += 1;
    }
    match per_date
        .into_iter()
        .find(|(_, booked)| *booked > draft.capacity as usize)
    {
        Some((date, booked)) => Err(Error::Validation(format!(
            "capacity {} is below the {booked} bookings on {date}",
            draft.capacity
        ))),
        None => Ok(()),
    }
}

/// Credit back every booking dated `from` or later and drop those entries
///
/// Must run inside the caller's transaction.
fn refund_bookings_from(conn: &Connection, id: ClassId, from: DateKey) -> Result<Vec<Refund>> {
    let classes = ClassStore::new(conn);
    let users = UserStore::new(conn);

    let mut per_student: BTreeMap<UserId, Refund> = BTreeMap::new();
    for charge in classes.charges_from(id, from)? {
        let refund = per_student
            .entry(charge.student_id.clone())
            .or_insert_with(|| Refund {
                student_id: charge.student_id,
                amount: Decimal::ZERO,
                dates: Vec::new(),
            });
        refund.amount += charge.charged;
        refund.dates.push(charge.date);
    }

    for refund in per_student.values() {
        if refund.amount.is_zero() {
            continue;
        }
        match users.find_by_id(&refund.student_id)? {
            Some(user) => {
                users.set_credits(&user.id, round_credits(user.credits + refund.amount))?;
            }
            None => warn!(
                student_id = %refund.student_id,
                amount = %refund.amount,
                "Ghost booking dropped without refund"
            ),
        }
    }

    let dropped = classes.clear_bookings_from(id, from)?;
    if dropped > 0 {
        warn!(class_id = %id, dropped, "Future bookings dropped and refunded");
    }
    Ok(per_student.into_values().collect())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDateTime, Weekday};

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;
    use crate::ledger::{BookingLedger, BookingOverrides};
    use crate::models::{Difficulty, Instructor, Role, User};
    use crate::notify::MemoryNotifier;
    use crate::projector::{project, reconstruct_day};
    use crate::storage::{ClassRepository, InstructorRepository, UserRepository};

    fn key(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn draft(start: &str, instructor: &str) -> ClassDraft {
        ClassDraft {
            title: "Morning Flow".into(),
            description: String::new(),
            location: "Studio A".into(),
            difficulty: Difficulty::Beginner,
            day_of_week: Weekday::Wed,
            start_time: start.parse().unwrap(),
            duration_minutes: 60,
            instructor_id: InstructorId::from(instructor),
            capacity: 10,
            points_cost: Decimal::new(15, 1),
        }
    }

    struct Fixture {
        db: Database,
        clock: FixedClock,
        notifier: MemoryNotifier,
        admin: Principal,
    }

    impl Fixture {
        // Monday 2024-01-08, noon
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            for id in ["ana", "ben", "cy"] {
                db.create_instructor(&Instructor::new(InstructorId::from(id), id.to_uppercase()))
                    .unwrap();
            }
            let admin = User::new(UserId::from("boss"), "Boss".into(), Role::Admin);
            db.create_user(&admin).unwrap();
            Self {
                db,
                clock: FixedClock::new(at("2024-01-08 12:00:00")),
                notifier: MemoryNotifier::new(),
                admin: Principal::new(admin.id, Role::Admin),
            }
        }

        fn lifecycle(&self) -> ClassLifecycle<'_> {
            ClassLifecycle::new(&self.db, &self.clock, &self.notifier)
        }

        fn ledger(&self) -> BookingLedger<'_> {
            BookingLedger::new(&self.db, &self.clock).unwrap()
        }

        fn student(&self, id: &str, credits: Decimal) -> UserId {
            let mut user = User::new(UserId::from(id), id.to_uppercase(), Role::Student);
            user.credits = credits;
            user.phone = Some(format!("555-{id}"));
            self.db.create_user(&user).unwrap();
            user.id
        }

        fn credits(&self, id: &UserId) -> Decimal {
            self.db.find_user(id).unwrap().unwrap().credits
        }
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let fx = Fixture::new();
        let first = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let second = fx.lifecycle().create(&fx.admin, draft("10:00", "ben")).unwrap();
        assert_eq!(first.id, ClassId(1));
        assert_eq!(second.id, ClassId(2));
        assert_eq!(first.created_at, key("2024-01-08"));
        assert!(first.bookings.is_empty());
        assert!(!first.archived);
    }

    #[test]
    fn test_create_rejects_conflicts_and_bad_input() {
        let fx = Fixture::new();
        fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();

        let err = fx.lifecycle().create(&fx.admin, draft("10:30", "ana")).unwrap_err();
        match err {
            Error::InstructorConflict { title, start_time } => {
                assert_eq!(title, "Morning Flow");
                assert_eq!(start_time.to_string(), "10:00");
            }
            other => panic!("expected InstructorConflict, got {other:?}"),
        }
        fx.lifecycle().create(&fx.admin, draft("11:00", "ana")).unwrap();

        let err = fx.lifecycle().create(&fx.admin, draft("10:00", "nobody")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut empty = draft("14:00", "ana");
        empty.capacity = 0;
        let err = fx.lifecycle().create(&fx.admin, empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let student = Principal::new(UserId::from("s1"), Role::Student);
        let err = fx.lifecycle().create(&student, draft("16:00", "ana")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_update_in_place_keeps_bookings() {
        let fx = Fixture::new();
        let created = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let s1 = fx.student("s1", Decimal::from(5));
        fx.ledger()
            .book(&fx.admin, created.id, &s1, key("2024-01-10"), BookingOverrides::default())
            .unwrap();

        let mut edit = created.to_draft();
        edit.title = "Slow Flow".into();
        edit.capacity = 12;
        match fx.lifecycle().update(&fx.admin, created.id, edit).unwrap() {
            UpdateOutcome::Updated(t) => {
                assert_eq!(t.id, created.id);
                assert_eq!(t.title, "Slow Flow");
            }
            other => panic!("expected in-place update, got {other:?}"),
        }

        let stored = fx.db.find_class(created.id).unwrap().unwrap();
        assert_eq!(stored.capacity, 12);
        assert_eq!(stored.roster_on(key("2024-01-10")).unwrap().len(), 1);
    }

    #[test]
    fn test_update_cannot_shrink_capacity_below_bookings() {
        let fx = Fixture::new();
        let mut small = draft("10:00", "ana");
        small.capacity = 3;
        let created = fx.lifecycle().create(&fx.admin, small).unwrap();
        for id in ["s1", "s2", "s3"] {
            let student = fx.student(id, Decimal::from(5));
            fx.ledger()
                .book(&fx.admin, created.id, &student, key("2024-01-10"), BookingOverrides::default())
                .unwrap();
        }

        let mut edit = created.to_draft();
        edit.capacity = 1;
        let err = fx.lifecycle().update(&fx.admin, created.id, edit).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let stored = fx.db.find_class(created.id).unwrap().unwrap();
        assert_eq!(stored.capacity, 3);
        assert_eq!(stored.roster_on(key("2024-01-10")).unwrap().len(), 3);

        // Shrinking to exactly the roster size is fine
        let mut edit = created.to_draft();
        edit.capacity = 3;
        edit.title = "Full Flow".into();
        assert!(matches!(
            fx.lifecycle().update(&fx.admin, created.id, edit).unwrap(),
            UpdateOutcome::Updated(_)
        ));
    }

    #[test]
    fn test_update_cannot_move_weekday_with_upcoming_bookings() {
        let fx = Fixture::new();
        let created = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let s1 = fx.student("s1", Decimal::from(5));
        fx.ledger()
            .book(&fx.admin, created.id, &s1, key("2024-01-10"), BookingOverrides::default())
            .unwrap();

        let mut edit = created.to_draft();
        edit.day_of_week = Weekday::Thu;
        let err = fx.lifecycle().update(&fx.admin, created.id, edit.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fx.db.find_class(created.id).unwrap().unwrap().day_of_week, Weekday::Wed);

        fx.ledger()
            .cancel(&fx.admin, created.id, &s1, key("2024-01-10"))
            .unwrap();
        match fx.lifecycle().update(&fx.admin, created.id, edit).unwrap() {
            UpdateOutcome::Updated(t) => assert_eq!(t.day_of_week, Weekday::Thu),
            other => panic!("expected in-place update, got {other:?}"),
        }
    }

    #[test]
    fn test_fork_preserves_history_and_refunds_future() {
        let fx = Fixture::new();
        let created = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let s1 = fx.student("s1", Decimal::from(5));

        // One past occurrence and one upcoming
        fx.ledger()
            .book(&fx.admin, created.id, &s1, key("2024-01-03"), BookingOverrides::default())
            .unwrap();
        fx.ledger()
            .book(&fx.admin, created.id, &s1, key("2024-01-10"), BookingOverrides::default())
            .unwrap();
        assert_eq!(fx.credits(&s1), Decimal::from(2));

        let mut edit = created.to_draft();
        edit.instructor_id = InstructorId::from("ben");
        let outcome = fx.lifecycle().update(&fx.admin, created.id, edit).unwrap();
        let UpdateOutcome::Forked { archived, successor, refunds, notified } = outcome else {
            panic!("expected fork");
        };
        assert_eq!(archived, created.id);
        assert_eq!(successor.id, ClassId(2));
        assert!(successor.bookings.is_empty());
        assert_eq!(successor.created_at, key("2024-01-08"));
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, Decimal::new(15, 1));
        assert_eq!(refunds[0].dates, vec![key("2024-01-10")]);
        assert!(notified);
        assert_eq!(fx.credits(&s1), Decimal::new(35, 1));

        let old = fx.db.find_class(created.id).unwrap().unwrap();
        assert!(old.archived);
        assert_eq!(old.archived_at, Some(key("2024-01-07")));
        assert_eq!(old.roster_on(key("2024-01-03")).unwrap().len(), 1);
        assert!(old.roster_on(key("2024-01-10")).is_none());

        let all = fx.db.list_classes(ClassFilter::All).unwrap();
        let last_week = reconstruct_day(&all, key("2024-01-03"));
        assert_eq!(last_week.len(), 1);
        assert_eq!(last_week[0].instructor_id.as_str(), "ana");
        let next_week = reconstruct_day(&all, key("2024-01-10"));
        assert_eq!(next_week.len(), 1);
        assert_eq!(next_week[0].instructor_id.as_str(), "ben");
    }

    #[test]
    fn test_substitution_is_date_scoped() {
        let fx = Fixture::new();
        let created = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let ben = InstructorId::from("ben");

        fx.lifecycle()
            .assign_substitute(&fx.admin, created.id, key("2024-01-10"), &ben)
            .unwrap();
        let stored = fx.db.find_class(created.id).unwrap().unwrap();
        assert!(project(&stored, key("2024-01-10")).is_substitute);
        assert_eq!(project(&stored, key("2024-01-17")).effective_instructor_id.as_str(), "ana");

        let err = fx
            .lifecycle()
            .assign_substitute(&fx.admin, created.id, key("2024-01-11"), &ben)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Assigning the base instructor clears the entry
        fx.lifecycle()
            .assign_substitute(&fx.admin, created.id, key("2024-01-10"), &InstructorId::from("ana"))
            .unwrap();
        let stored = fx.db.find_class(created.id).unwrap().unwrap();
        assert!(stored.substitutions.is_empty());
        assert!(!fx.lifecycle().clear_substitute(&fx.admin, created.id, key("2024-01-10")).unwrap());
    }

    #[test]
    fn test_substitute_conflict_only_on_that_date() {
        let fx = Fixture::new();
        let morning = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let late = fx.lifecycle().create(&fx.admin, draft("10:30", "ben")).unwrap();
        let ben = InstructorId::from("ben");

        // ben teaches at 10:30 every Wednesday
        let err = fx
            .lifecycle()
            .assign_substitute(&fx.admin, morning.id, key("2024-01-10"), &ben)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstructorConflict);

        // With cy covering ben's class on the 17th, ben is free that day only
        fx.lifecycle()
            .assign_substitute(&fx.admin, late.id, key("2024-01-17"), &InstructorId::from("cy"))
            .unwrap();
        fx.lifecycle()
            .assign_substitute(&fx.admin, morning.id, key("2024-01-17"), &ben)
            .unwrap();
        assert!(fx
            .lifecycle()
            .assign_substitute(&fx.admin, morning.id, key("2024-01-24"), &ben)
            .is_err());
    }

    #[test]
    fn test_delete_without_future_bookings_archives_silently() {
        let fx = Fixture::new();
        let created = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();

        assert_eq!(fx.lifecycle().delete(&fx.admin, created.id).unwrap(), DeleteOutcome::Archived);
        let stored = fx.db.find_class(created.id).unwrap().unwrap();
        assert!(stored.archived);
        assert_eq!(stored.archived_at, Some(key("2024-01-08")));
        assert!(fx.notifier.sent().is_empty());

        let err = fx.lifecycle().delete(&fx.admin, created.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_delete_refunds_each_student_in_full() {
        let fx = Fixture::new();
        let created = fx.lifecycle().create(&fx.admin, draft("10:00", "ana")).unwrap();
        let students = [fx.student("s1", Decimal::from(10)), fx.student("s2", Decimal::from(10))];

        for date in ["2024-01-10", "2024-01-17", "2024-01-24"] {
            for s in &students {
                fx.ledger()
                    .book(&fx.admin, created.id, s, key(date), BookingOverrides::default())
                    .unwrap();
            }
        }
        for s in &students {
            assert_eq!(fx.credits(s), Decimal::new(55, 1));
        }

        let outcome = fx.lifecycle().delete(&fx.admin, created.id).unwrap();
        let DeleteOutcome::Refunded { refunds, notified } = outcome else {
            panic!("expected refunds");
        };
        assert!(notified);
        assert_eq!(refunds.len(), 2);
        for refund in &refunds {
            assert_eq!(refund.amount, Decimal::new(45, 1));
            assert_eq!(refund.dates.len(), 3);
        }
        for s in &students {
            assert_eq!(fx.credits(s), Decimal::from(10));
        }

        let stored = fx.db.find_class(created.id).unwrap().unwrap();
        assert!(stored.archived);
        assert!(!stored.has_bookings_from(key("2024-01-08")));

        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients.len(), 2);
        assert!(sent[0].message.contains("Morning Flow"));
    }
}
