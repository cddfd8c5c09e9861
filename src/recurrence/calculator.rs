//! Pure occurrence arithmetic.

use chrono::{Datelike, Days, Months, NaiveDate};

use crate::models::{RecurrenceKind, RecurrenceRule};

/// Compute the next scheduled occurrence strictly after `reference`.
///
/// The reference date is already day-granular (`NaiveDate`), so no
/// normalization is needed here. Returns `None` for `RecurrenceKind::None`
/// — "no further occurrences" is a normal outcome, never an error.
///
/// Deterministic: identical inputs always produce identical output, and a
/// non-`None` result is always strictly after `reference`.
pub fn next_occurrence(
    reference: NaiveDate,
    kind: RecurrenceKind,
    rule: &RecurrenceRule,
) -> Option<NaiveDate> {
    match kind {
        RecurrenceKind::None => None,
        RecurrenceKind::Daily => reference.checked_add_days(Days::new(1)),
        RecurrenceKind::Weekly => next_weekly(reference, rule),
        RecurrenceKind::Monthly => next_monthly(reference, rule),
        RecurrenceKind::Yearly => next_yearly(reference, rule),
    }
}

/// One week ahead; with a target weekday, snap the candidate backward onto
/// that weekday so the result is the earliest matching day after the
/// reference, adding a week if the snap lands on or before it.
fn next_weekly(reference: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let mut next = reference.checked_add_days(Days::new(7))?;
    if let Some(target) = rule.day_of_week {
        let target = target % 7;
        let current = next.weekday().num_days_from_sunday();
        let back = (current + 7 - target) % 7;
        next = next.checked_sub_days(Days::new(u64::from(back)))?;
        if next <= reference {
            next = next.checked_add_days(Days::new(7))?;
        }
    }
    Some(next)
}

/// One month ahead; a target day-of-month clamps to the month's length
/// (Jan 31 -> Feb 28/29). If the clamped result failed to move past the
/// reference while still inside the step month, roll one more month and
/// re-clamp.
fn next_monthly(reference: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let step = reference.checked_add_months(Months::new(1))?;
    let mut next = step;
    if let Some(day) = rule.day_of_month {
        next = clamp_to_day(next, day)?;
        if next <= reference && next.month() == step.month() && next.year() == step.year() {
            next = clamp_to_day(next.checked_add_months(Months::new(1))?, day)?;
        }
    }
    Some(next)
}

/// One year ahead, with optional month (0-11) and day-of-month overrides.
/// Overrides apply in order year, month, day, clamping the day last; if the
/// result is not strictly after the reference and still inside the step
/// year, roll one more year and re-apply.
fn next_yearly(reference: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let step = reference.checked_add_months(Months::new(12))?;
    let mut next = apply_yearly_overrides(step, rule)?;
    if next <= reference && next.year() == step.year() {
        next = apply_yearly_overrides(step.checked_add_months(Months::new(12))?, rule)?;
    }
    Some(next)
}

fn apply_yearly_overrides(date: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let mut next = date;
    if let Some(month) = rule.month {
        let month = month % 12 + 1;
        let day = next.day().min(days_in_month(next.year(), month)?);
        next = NaiveDate::from_ymd_opt(next.year(), month, day)?;
    }
    if let Some(day) = rule.day_of_month {
        next = clamp_to_day(next, day)?;
    }
    Some(next)
}

fn clamp_to_day(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(date.year(), date.month())?);
    date.with_day(day)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.signed_duration_since(first).num_days() as u32)
}
