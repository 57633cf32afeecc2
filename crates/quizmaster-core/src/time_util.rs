//! Calendar helpers for report generation.

use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

/// First and last day of the calendar month preceding `now`.
pub fn previous_month(now: OffsetDateTime) -> (Date, Date) {
    let date = now.date();
    let (year, month) = match date.month() {
        Month::January => (date.year() - 1, Month::December),
        m => (date.year(), m.previous()),
    };

    let days = time::util::days_in_year_month(year, month);
    // Day 1 and the month's own length are always valid calendar dates.
    let first = Date::from_calendar_date(year, month, 1).unwrap_or(date);
    let last = Date::from_calendar_date(year, month, days).unwrap_or(date);
    (first, last)
}

/// Format a date as `YYYY-MM-DD`, the format quiz dates are stored in.
pub fn format_date(date: Date) -> String {
    let desc = format_description!("[year]-[month]-[day]");
    date.format(&desc).unwrap_or_else(|_| date.to_string())
}

/// Human label for a month, e.g. `"March 2026"`.
pub fn month_label(date: Date) -> String {
    format!("{} {}", date.month(), date.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn previous_month_mid_year() {
        let (first, last) = previous_month(datetime!(2026-08-06 12:00 UTC));
        assert_eq!(format_date(first), "2026-07-01");
        assert_eq!(format_date(last), "2026-07-31");
    }

    #[test]
    fn previous_month_wraps_year() {
        let (first, last) = previous_month(datetime!(2026-01-15 00:00 UTC));
        assert_eq!(format_date(first), "2025-12-01");
        assert_eq!(format_date(last), "2025-12-31");
    }

    #[test]
    fn previous_month_handles_february() {
        let (_, last) = previous_month(datetime!(2024-03-01 00:00 UTC));
        // 2024 is a leap year
        assert_eq!(format_date(last), "2024-02-29");
    }

    #[test]
    fn month_label_is_readable() {
        let (first, _) = previous_month(datetime!(2026-08-06 12:00 UTC));
        assert_eq!(month_label(first), "July 2026");
    }
}
