//! Instructor minutes, session logs and salaries for a date range

use std::collections::{BTreeMap, HashMap};

use chrono::Weekday;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::models::{ClassId, ClassTemplate, DateKey, Instructor, InstructorId, TimeOfDay};
use crate::permissions::{Principal, StudioAction};
use crate::projector::{project, reconstruct_day};
use crate::storage::{ClassFilter, Database, Storage};

const UNKNOWN_INSTRUCTOR: &str = "Unknown instructor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionKind {
    Base,
    Sub,
}

/// One taught occurrence credited to an instructor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLog {
    pub date: DateKey,
    pub weekday: Weekday,
    pub start_time: TimeOfDay,
    pub class_id: ClassId,
    pub title: String,
    pub kind: SessionKind,
    /// Base instructor, when someone else covered
    pub original_instructor_name: Option<String>,
    pub duration_minutes: u32,
    pub attendees: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructorPayroll {
    pub instructor_id: InstructorId,
    pub name: String,
    pub total_minutes: u32,
    pub class_count: usize,
    pub rate: Decimal,
    pub salary: Decimal,
    pub sessions: Vec<SessionLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollReport {
    pub start: DateKey,
    pub end: DateKey,
    pub instructors: Vec<InstructorPayroll>,
    pub total_payout: Decimal,
}

/// `minutes / 60 * rate`, rounded to whole currency units
pub fn salary_for(minutes: u32, rate: Decimal) -> Result<Decimal> {
    Decimal::from(minutes)
        .checked_mul(rate)
        .map(|pay| {
            (pay / Decimal::from(60)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        })
        .ok_or_else(|| Error::Validation(format!("rate {rate} is out of range for {minutes} minutes")))
}

/// Aggregate every occurrence in `[start, end]` onto the instructor who taught it
///
/// Rates come from `rates` first, then the instructor's own default, then
/// `default_rate`. Every known instructor is listed, sorted by name.
pub fn build_payroll(
    templates: &[ClassTemplate],
    instructors: &[Instructor],
    start: DateKey,
    end: DateKey,
    rates: &HashMap<InstructorId, Decimal>,
    default_rate: Decimal,
) -> Result<PayrollReport> {
    if start > end {
        return Err(Error::Validation(format!(
            "payroll range starts after it ends ({start} > {end})"
        )));
    }

    let known: HashMap<&InstructorId, &Instructor> =
        instructors.iter().map(|i| (&i.id, i)).collect();
    let name_of = |id: &InstructorId| {
        known
            .get(id)
            .map_or_else(|| UNKNOWN_INSTRUCTOR.to_string(), |i| i.name.clone())
    };

    let mut sessions: BTreeMap<InstructorId, Vec<SessionLog>> = BTreeMap::new();
    for date in start.through(end) {
        for template in reconstruct_day(templates, date) {
            let occurrence = project(template, date);
            let (kind, original_instructor_name) = if occurrence.is_substitute {
                (SessionKind::Sub, Some(name_of(&occurrence.base_instructor_id)))
            } else {
                (SessionKind::Base, None)
            };

            sessions
                .entry(occurrence.effective_instructor_id.clone())
                .or_default()
                .push(SessionLog {
                    date,
                    weekday: date.weekday(),
                    start_time: occurrence.start_time,
                    class_id: occurrence.template_id,
                    title: occurrence.title.clone(),
                    kind,
                    original_instructor_name,
                    duration_minutes: occurrence.duration_minutes,
                    attendees: occurrence.roster.len(),
                });
        }
    }

    let rate_for = |id: &InstructorId| -> Decimal {
        rates
            .get(id)
            .copied()
            .or_else(|| {
                known
                    .get(id)
                    .map(|i| i.default_rate)
                    .filter(|rate| !rate.is_zero())
            })
            .unwrap_or(default_rate)
    };

    let mut ids: Vec<InstructorId> = instructors.iter().map(|i| i.id.clone()).collect();
    ids.extend(sessions.keys().filter(|id| !known.contains_key(id)).cloned());

    let mut payroll = ids
        .into_iter()
        .map(|id| {
            let logs = sessions.remove(&id).unwrap_or_default();
            let total_minutes = logs.iter().map(|s| s.duration_minutes).sum();
            let rate = rate_for(&id);
            Ok(InstructorPayroll {
                name: name_of(&id),
                instructor_id: id,
                total_minutes,
                class_count: logs.len(),
                rate,
                salary: salary_for(total_minutes, rate)?,
                sessions: logs,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    payroll.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.instructor_id.cmp(&b.instructor_id)));

    let total_payout = payroll
        .iter()
        .try_fold(Decimal::ZERO, |total, p| total.checked_add(p.salary))
        .ok_or_else(|| Error::Validation("total payout is out of range".into()))?;
    Ok(PayrollReport {
        start,
        end,
        instructors: payroll,
        total_payout,
    })
}

/// Payroll straight from storage, with the studio's default rate
#[instrument(skip(db, actor, rates), fields(actor = %actor.user_id))]
pub fn run_payroll<S: Storage>(
    db: &S,
    actor: &Principal,
    start: DateKey,
    end: DateKey,
    rates: &HashMap<InstructorId, Decimal>,
) -> Result<PayrollReport> {
    actor.require(StudioAction::ViewPayroll)?;
    let templates = db.list_classes(ClassFilter::All)?;
    let instructors = db.list_instructors()?;
    let default_rate = db.studio_settings()?.default_hourly_rate;

    let report = build_payroll(&templates, &instructors, start, end, rates, default_rate)?;
    debug!(
        instructors = report.instructors.len(),
        total = %report.total_payout,
        "Payroll built"
    );
    Ok(report)
}

/// Convenience for callers holding the concrete database
pub fn run_payroll_db(
    db: &Database,
    actor: &Principal,
    start: DateKey,
    end: DateKey,
) -> Result<PayrollReport> {
    run_payroll(db, actor, start, end, &HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassDraft, Difficulty, Role, UserId};

    fn key(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn template(id: u32, day: Weekday, start: &str, minutes: u32, instructor: &str, created: &str) -> ClassTemplate {
        let draft = ClassDraft {
            title: format!("Class {id}"),
            description: String::new(),
            location: String::new(),
            difficulty: Difficulty::Beginner,
            day_of_week: day,
            start_time: start.parse().unwrap(),
            duration_minutes: minutes,
            instructor_id: InstructorId::from(instructor),
            capacity: 10,
            points_cost: Decimal::ONE,
        };
        ClassTemplate::from_draft(ClassId(id), draft, key(created))
    }

    fn instructor(id: &str, name: &str, rate: i64) -> Instructor {
        let mut i = Instructor::new(InstructorId::from(id), name.to_string());
        i.default_rate = Decimal::from(rate);
        i
    }

    #[test]
    fn test_salary_rounds_to_whole_units() {
        assert_eq!(salary_for(90, Decimal::from(20)).unwrap(), Decimal::from(30));
        assert_eq!(salary_for(50, Decimal::from(25)).unwrap(), Decimal::from(21));
        assert_eq!(salary_for(0, Decimal::from(25)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_huge_rate_is_rejected_not_overflowed() {
        let err = salary_for(600, Decimal::MAX).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let t = template(1, Weekday::Wed, "10:00", 120, "ana", "2024-01-01");
        let rates = HashMap::from([(InstructorId::from("ana"), Decimal::MAX)]);
        let err = build_payroll(
            &[t],
            &[instructor("ana", "Ana", 30)],
            key("2024-01-10"),
            key("2024-01-10"),
            &rates,
            Decimal::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_substitute_is_credited_with_the_session() {
        let mut t = template(1, Weekday::Wed, "10:00", 60, "ana", "2024-01-01");
        t.substitutions.insert(key("2024-01-10"), InstructorId::from("ben"));
        t.bookings.entry(key("2024-01-10")).or_default().insert(UserId::from("s1"));
        let instructors = vec![instructor("ana", "Ana", 30), instructor("ben", "Ben", 20)];

        let report = build_payroll(
            &[t],
            &instructors,
            key("2024-01-08"),
            key("2024-01-21"),
            &HashMap::new(),
            Decimal::ZERO,
        )
        .unwrap();

        let ana = &report.instructors[0];
        let ben = &report.instructors[1];
        assert_eq!(ana.name, "Ana");
        assert_eq!(ana.total_minutes, 60);
        assert_eq!(ana.sessions[0].date, key("2024-01-17"));
        assert_eq!(ana.sessions[0].kind, SessionKind::Base);
        assert_eq!(ben.class_count, 1);
        assert_eq!(ben.sessions[0].kind, SessionKind::Sub);
        assert_eq!(ben.sessions[0].original_instructor_name.as_deref(), Some("Ana"));
        assert_eq!(ben.sessions[0].attendees, 1);
        assert_eq!(ana.salary, Decimal::from(30));
        assert_eq!(ben.salary, Decimal::from(20));
        assert_eq!(report.total_payout, Decimal::from(50));
    }

    #[test]
    fn test_forked_slot_counted_once() {
        let mut old = template(1, Weekday::Fri, "10:00", 60, "ana", "2023-06-01");
        old.archived = true;
        old.archived_at = Some(key("2024-01-09"));
        let new = template(2, Weekday::Fri, "10:00", 90, "ben", "2024-01-10");
        let instructors = vec![instructor("ana", "Ana", 0), instructor("ben", "Ben", 0)];

        let report = build_payroll(
            &[old, new],
            &instructors,
            key("2024-01-01"),
            key("2024-01-31"),
            &HashMap::new(),
            Decimal::from(40),
        )
        .unwrap();

        // Fridays: 5th with ana; 12th, 19th and 26th with ben
        assert_eq!(report.instructors[0].class_count, 1);
        assert_eq!(report.instructors[1].class_count, 3);
        assert_eq!(report.instructors[1].total_minutes, 270);
        assert_eq!(report.instructors[1].salary, Decimal::from(180));
    }

    #[test]
    fn test_rates_override_and_unknown_instructors() {
        let t = template(1, Weekday::Mon, "09:00", 45, "ghost", "2024-01-01");
        let u = template(2, Weekday::Mon, "18:00", 60, "ana", "2024-01-01");
        let instructors = vec![instructor("ana", "Ana", 30), instructor("cy", "Cy", 10)];
        let rates: HashMap<InstructorId, Decimal> =
            [(InstructorId::from("ana"), Decimal::from(50))].into_iter().collect();

        let report = build_payroll(
            &[t, u],
            &instructors,
            key("2024-01-08"),
            key("2024-01-08"),
            &rates,
            Decimal::from(12),
        )
        .unwrap();

        let names: Vec<&str> = report.instructors.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Cy", UNKNOWN_INSTRUCTOR]);
        assert_eq!(report.instructors[0].salary, Decimal::from(50));
        assert_eq!(report.instructors[1].class_count, 0);
        assert_eq!(report.instructors[2].rate, Decimal::from(12));
        assert_eq!(report.instructors[2].salary, Decimal::from(9));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = build_payroll(&[], &[], key("2024-02-01"), key("2024-01-01"), &HashMap::new(), Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_run_payroll_requires_admin() {
        let db = Database::open_in_memory().unwrap();
        let student = Principal::new(UserId::from("s1"), Role::Student);
        assert!(run_payroll_db(&db, &student, key("2024-01-01"), key("2024-01-07")).is_err());

        let admin = Principal::new(UserId::from("boss"), Role::Admin);
        let report = run_payroll_db(&db, &admin, key("2024-01-01"), key("2024-01-07")).unwrap();
        assert!(report.instructors.is_empty());
        assert_eq!(report.total_payout, Decimal::ZERO);
    }
}
