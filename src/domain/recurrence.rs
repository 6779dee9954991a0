use chrono::{Datelike, NaiveDate};

use crate::domain::models::{RecurrencePattern, Task};

/// Weekday index with the persisted numbering: Sunday = 0 through
/// Saturday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Whether a recurring task produces an occurrence on `date`.
///
/// Dates before the task existed never recur, and a configured end date cuts
/// the series off after it. A task without a recognized pattern fails safe
/// and never recurs.
pub fn should_recur_on(task: &Task, date: NaiveDate) -> bool {
    if !task.is_recurring {
        return false;
    }
    let Some(pattern) = task.recurrence_pattern else {
        return false;
    };

    if let Some(end_date) = task.recurrence_end_date {
        if date > end_date {
            return false;
        }
    }

    let anchor = task.recurrence_anchor();
    if date < anchor {
        return false;
    }

    let day_of_week = weekday_index(date);
    match pattern {
        RecurrencePattern::Daily => true,
        RecurrencePattern::Weekdays => (1..=5).contains(&day_of_week),
        RecurrencePattern::Weekly => task.recurrence_days.contains(&day_of_week),
        RecurrencePattern::Biweekly => {
            let elapsed_weeks = (date - anchor).num_days().div_euclid(7);
            elapsed_weeks % 2 == 0 && task.recurrence_days.contains(&day_of_week)
        }
        RecurrencePattern::Monthly => date.day() == anchor.day(),
    }
}
