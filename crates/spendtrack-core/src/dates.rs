//! Date and month-span utilities shared by the importer, the live-add
//! paths and the aggregator.

use time::{macros::date, Date, Month};

/// Start date used when a recurring sheet row carries the `-` sentinel in
/// its `Start Month` column.
pub const FALLBACK_START: Date = date!(2023 - 01 - 01);

/// Maps a three-letter month abbreviation to its month number. The match is
/// case-sensitive: the source worksheets always use `Jan`..`Dec`.
pub fn month_abbrev_to_int(name: &str) -> Option<u8> {
    match name {
        "Jan" => Some(1),
        "Feb" => Some(2),
        "Mar" => Some(3),
        "Apr" => Some(4),
        "May" => Some(5),
        "Jun" => Some(6),
        "Jul" => Some(7),
        "Aug" => Some(8),
        "Sep" => Some(9),
        "Oct" => Some(10),
        "Nov" => Some(11),
        "Dec" => Some(12),
        _ => None,
    }
}

fn merge_date(month: Option<&str>, year: Option<i64>) -> Option<Date> {
    let m = month_abbrev_to_int(month?)?;
    let y = i32::try_from(year?).ok()?;
    Date::from_calendar_date(y, Month::try_from(m).ok()?, 1).ok()
}

/// Combines a recurring sheet's `Start Month`/`Start Year` cells into the
/// first day of that month. The `-` sentinel yields [`FALLBACK_START`];
/// anything unparseable yields `None` and the row is kept with a null
/// start date.
pub fn merge_start_date(month: Option<&str>, year: Option<i64>) -> Option<Date> {
    if month == Some("-") {
        return Some(FALLBACK_START);
    }
    merge_date(month, year)
}

/// Combines `End Month`/`End Year` cells. The `-` sentinel means the
/// record is open-ended, so both the sentinel and a parse failure yield
/// `None`.
pub fn merge_end_date(month: Option<&str>, year: Option<i64>) -> Option<Date> {
    if month == Some("-") {
        return None;
    }
    merge_date(month, year)
}

/// Lenient `YYYY-MM-DD` parser. Returns `None` on anything malformed.
pub fn parse_iso_date(s: &str) -> Option<Date> {
    let mut parts = s.trim().splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u8>().ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

pub fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

/// Number of whole months covered by the inclusive span `start..=end`.
/// A span whose end precedes its start would produce a zero or negative
/// divisor for amortization, so the result is clamped to 1.
pub fn month_span(start: Date, end: Date) -> u32 {
    let months = (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32) + 1;
    months.max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_abbrevs_are_case_sensitive() {
        assert_eq!(month_abbrev_to_int("Jan"), Some(1));
        assert_eq!(month_abbrev_to_int("Dec"), Some(12));
        assert_eq!(month_abbrev_to_int("jan"), None);
        assert_eq!(month_abbrev_to_int("JAN"), None);
        assert_eq!(month_abbrev_to_int("January"), None);
    }

    #[test]
    fn merge_start_date_round_trips() {
        for (i, name) in [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ]
        .iter()
        .enumerate()
        {
            let d = merge_start_date(Some(name), Some(2022)).unwrap();
            assert_eq!(date_to_str(d), format!("2022-{:02}-01", i + 1));
        }
    }

    #[test]
    fn merge_start_date_sentinel_defaults() {
        assert_eq!(
            merge_start_date(Some("-"), Some(2025)),
            Some(FALLBACK_START)
        );
        // Sentinel wins even when the year cell is junk
        assert_eq!(merge_start_date(Some("-"), None), Some(FALLBACK_START));
    }

    #[test]
    fn merge_end_date_sentinel_is_open() {
        assert_eq!(merge_end_date(Some("-"), Some(2025)), None);
    }

    #[test]
    fn merge_date_failures_yield_none() {
        assert_eq!(merge_start_date(Some("Janvier"), Some(2022)), None);
        assert_eq!(merge_start_date(Some("Jan"), None), None);
        assert_eq!(merge_end_date(None, Some(2022)), None);
    }

    #[test]
    fn parse_iso_date_accepts_valid_rejects_junk() {
        assert_eq!(parse_iso_date("2023-07-15"), Some(date!(2023 - 07 - 15)));
        assert_eq!(parse_iso_date("2023-02-30"), None);
        assert_eq!(parse_iso_date("not-a-date"), None);
        assert_eq!(parse_iso_date(""), None);
    }

    #[test]
    fn month_span_inclusive() {
        // 2022-01 through 2023-03 is 15 months
        assert_eq!(month_span(date!(2022 - 01 - 01), date!(2023 - 03 - 01)), 15);
        assert_eq!(month_span(date!(2023 - 02 - 01), date!(2023 - 02 - 28)), 1);
        assert_eq!(month_span(date!(2023 - 01 - 01), date!(2023 - 12 - 31)), 12);
    }

    #[test]
    fn month_span_never_zero_or_negative() {
        // End before start: clamp instead of producing a bad divisor
        assert_eq!(month_span(date!(2023 - 05 - 01), date!(2023 - 01 - 01)), 1);
    }
}
