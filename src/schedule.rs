//! Medication recurrence: decides which reminders fall on a calendar date.
//!
//! Everything here is pure. A rule that cannot be evaluated (missing or
//! out-of-range day field, unknown frequency) is simply never due; strict
//! checking happens once, in [`validate`], when a rule is created or edited.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::models::{Frequency, MedicationRule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("medication name must not be blank")]
    BlankName,

    #[error("unknown frequency")]
    UnknownFrequency,

    #[error("{0} reminders need a day of the week")]
    MissingDayOfWeek(Frequency),

    #[error("monthly reminders need a day of the month")]
    MissingDayOfMonth,

    #[error("day of week must be 0-6 (Sunday = 0), got {0}")]
    DayOfWeekOutOfRange(u8),

    #[error("day of month must be 1-31, got {0}")]
    DayOfMonthOutOfRange(u8),

    #[error("{0} reminders do not take a day of the week")]
    UnexpectedDayOfWeek(Frequency),

    #[error("{0} reminders do not take a day of the month")]
    UnexpectedDayOfMonth(Frequency),
}

/// Strict shape check for a rule about to be stored.
pub fn validate(rule: &MedicationRule) -> Result<(), RuleError> {
    if rule.name.trim().is_empty() {
        return Err(RuleError::BlankName);
    }
    evaluable(rule)?;

    let takes_weekday = matches!(rule.frequency, Frequency::Weekly | Frequency::BiWeekly);
    if !takes_weekday && rule.day_of_week.is_some() {
        return Err(RuleError::UnexpectedDayOfWeek(rule.frequency));
    }
    if rule.frequency != Frequency::Monthly && rule.day_of_month.is_some() {
        return Err(RuleError::UnexpectedDayOfMonth(rule.frequency));
    }

    Ok(())
}

/// Checks only what [`is_due`] needs: a known frequency and its required
/// day field, in range. Extra fields and the name are not looked at.
fn evaluable(rule: &MedicationRule) -> Result<(), RuleError> {
    match rule.frequency {
        Frequency::Unknown => Err(RuleError::UnknownFrequency),
        Frequency::Daily => Ok(()),
        Frequency::Weekly | Frequency::BiWeekly => {
            let day = rule
                .day_of_week
                .ok_or(RuleError::MissingDayOfWeek(rule.frequency))?;
            if day > 6 {
                return Err(RuleError::DayOfWeekOutOfRange(day));
            }
            Ok(())
        }
        Frequency::Monthly => {
            let day = rule.day_of_month.ok_or(RuleError::MissingDayOfMonth)?;
            if !(1..=31).contains(&day) {
                return Err(RuleError::DayOfMonthOutOfRange(day));
            }
            Ok(())
        }
    }
}

pub fn is_due(rule: &MedicationRule, date: NaiveDate) -> bool {
    match rule.frequency {
        Frequency::Daily => true,
        Frequency::Weekly => weekday_matches(rule, date),
        Frequency::BiWeekly => weekday_matches(rule, date) && on_even_week(rule, date),
        // No clamping: day 31 never lands in a 30-day month.
        Frequency::Monthly => rule
            .day_of_month
            .filter(|day| (1..=31).contains(day))
            .is_some_and(|day| u32::from(day) == date.day()),
        Frequency::Unknown => false,
    }
}

/// Rules due on `date`, in the order given.
pub fn medications_due_on(rules: &[MedicationRule], date: NaiveDate) -> Vec<&MedicationRule> {
    rules
        .iter()
        .filter(|rule| match evaluable(rule) {
            Ok(()) => is_due(rule, date),
            Err(e) => {
                tracing::debug!(rule_id = %rule.id, error = %e, "skipping malformed medication rule");
                false
            }
        })
        .collect()
}

fn weekday_matches(rule: &MedicationRule, date: NaiveDate) -> bool {
    rule.day_of_week
        .filter(|day| *day <= 6)
        .is_some_and(|day| u32::from(day) == date.weekday().num_days_from_sunday())
}

/// Whole weeks since the rule's creation date, floored so the pattern also
/// extends backwards: -1 week is odd, -2 is even.
fn on_even_week(rule: &MedicationRule, date: NaiveDate) -> bool {
    let anchor = rule.created_at.date_naive();
    let weeks = (date - anchor).num_days().div_euclid(7);
    weeks.rem_euclid(2) == 0
}
