use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};

/// Last representable minute offset within a day.
const LAST_MINUTE_OF_DAY: u32 = 24 * 60 - 1;

pub fn minutes_of(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Inverse of [`minutes_of`] with zeroed seconds. Offsets past the end of the
/// day saturate at 23:59 so an occurrence never spills into the next date.
pub fn time_of(minutes: u32) -> NaiveTime {
    let clamped = minutes.min(LAST_MINUTE_OF_DAY);
    NaiveTime::from_hms_opt(clamped / 60, clamped % 60, 0).expect("minutes clamped to a valid time")
}

/// Parse an `HH:MM:SS` or `HH:MM` time-of-day value.
pub fn parse_time(value: &str) -> Result<NaiveTime, String> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| format!("time must be HH:MM or HH:MM:SS, got '{value}'"))
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Snap a minute offset to the nearest multiple of `slot_minutes`, ties
/// rounding up.
pub fn snap_to_slot(minutes: u32, slot_minutes: u32) -> u32 {
    if slot_minutes == 0 {
        return minutes;
    }
    ((minutes + slot_minutes / 2) / slot_minutes) * slot_minutes
}

/// 12-hour display form, e.g. "2:30 PM".
pub fn format_time_display(time: NaiveTime) -> String {
    let hour = time.hour();
    let meridiem = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        other => other,
    };
    format!("{display_hour}:{:02} {meridiem}", time.minute())
}

/// Relative label for an occurrence date in the inbox, e.g. "Today" or
/// "Feb 14".
pub fn schedule_label(scheduled: NaiveDate, current: NaiveDate) -> String {
    match (scheduled - current).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => format!("{} {}", month_abbreviation(scheduled.month()), scheduled.day()),
    }
}

/// Header label for the rendered day: relative name when near today,
/// weekday name otherwise.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => weekday_name(date.weekday()).to_string(),
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn month_abbreviation(month: u32) -> &'static str {
    match month {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        _ => "Dec",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn minutes_of_ignores_seconds() {
        let with_seconds = NaiveTime::from_hms_opt(9, 30, 42).expect("valid time");
        assert_eq!(minutes_of(with_seconds), 9 * 60 + 30);
    }

    #[test]
    fn time_of_saturates_at_end_of_day() {
        assert_eq!(time_of(24 * 60), time(23, 59));
        assert_eq!(time_of(24 * 60 + 90), time(23, 59));
    }

    #[test]
    fn parse_time_accepts_both_forms() {
        assert_eq!(parse_time("09:30:00"), Ok(time(9, 30)));
        assert_eq!(parse_time("09:30"), Ok(time(9, 30)));
        assert_eq!(parse_time(" 14:05 "), Ok(time(14, 5)));
    }

    #[test]
    fn parse_time_rejects_malformed_values() {
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("9h30").is_err());
        assert!(parse_time("").is_err());
    }

    #[test]
    fn format_time_zero_pads_with_seconds() {
        assert_eq!(format_time(time(9, 5)), "09:05:00");
    }

    // Property: parse then format normalizes any valid wall-clock value to
    // HH:MM:SS with zeroed seconds, and the minute offset round-trips.
    proptest! {
        #[test]
        fn minute_offsets_roundtrip(minutes in 0u32..(24 * 60)) {
            prop_assert_eq!(minutes_of(time_of(minutes)), minutes);
        }

        #[test]
        fn parse_format_roundtrip(hour in 0u32..24, minute in 0u32..60) {
            let raw = format!("{hour:02}:{minute:02}");
            let parsed = parse_time(&raw).expect("parse HH:MM");
            prop_assert_eq!(format_time(parsed), format!("{hour:02}:{minute:02}:00"));
        }
    }

    #[test]
    fn snapping_rounds_to_nearest_boundary() {
        assert_eq!(snap_to_slot(9 * 60 + 37, 15), 9 * 60 + 30);
        assert_eq!(snap_to_slot(9 * 60 + 38, 15), 9 * 60 + 45);
        assert_eq!(snap_to_slot(9 * 60 + 45, 15), 9 * 60 + 45);
        // Even slot sizes put the tie exactly halfway; it rounds up.
        assert_eq!(snap_to_slot(10 * 60 + 15, 30), 10 * 60 + 30);
    }

    #[test]
    fn display_formatting_uses_twelve_hour_clock() {
        assert_eq!(format_time_display(time(0, 5)), "12:05 AM");
        assert_eq!(format_time_display(time(9, 30)), "9:30 AM");
        assert_eq!(format_time_display(time(12, 0)), "12:00 PM");
        assert_eq!(format_time_display(time(14, 30)), "2:30 PM");
    }

    #[test]
    fn schedule_labels_are_relative_to_the_current_date() {
        let current = date(2024, 2, 13);
        assert_eq!(schedule_label(current, current), "Today");
        assert_eq!(schedule_label(date(2024, 2, 14), current), "Tomorrow");
        assert_eq!(schedule_label(date(2024, 2, 12), current), "Yesterday");
        assert_eq!(schedule_label(date(2024, 2, 20), current), "Feb 20");
    }

    #[test]
    fn day_labels_fall_back_to_weekday_names() {
        let today = date(2024, 1, 2);
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(date(2024, 1, 8), today), "Monday");
    }
}
