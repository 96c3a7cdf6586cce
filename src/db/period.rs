use chrono::{Local, NaiveDate};

/// Today's date as YYYY-MM-DD.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Builds a period_id from start and end dates.
/// Equal dates collapse to a single day (e.g. "2026-02-06"); otherwise a
/// range ("2026-02-01..2026-02-06").
pub fn make_period_id(start: &str, end: &str) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}..{}", start, end)
    }
}

/// Formats a period_id for human-readable display.
/// Single day: "Feb 06, 2026". Range: "Feb 01 - Feb 06, 2026".
pub fn format_period_display(period_id: &str) -> String {
    if let Some((start, end)) = period_id.split_once("..") {
        let (Ok(start), Ok(end)) = (
            NaiveDate::parse_from_str(start, "%Y-%m-%d"),
            NaiveDate::parse_from_str(end, "%Y-%m-%d"),
        ) else {
            return period_id.to_string();
        };
        return format!("{} - {}", start.format("%b %d"), end.format("%b %d, %Y"));
    }

    match NaiveDate::parse_from_str(period_id, "%Y-%m-%d") {
        Ok(d) => d.format("%b %d, %Y").to_string(),
        Err(_) => period_id.to_string(),
    }
}

/// Extracts the end date from a period_id (the date itself for single days).
pub fn period_end_date(period_id: &str) -> &str {
    match period_id.split_once("..") {
        Some((_, end)) => end,
        None => period_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_is_iso_date() {
        let t = today();
        assert_eq!(t.len(), 10);
        assert_eq!(t.as_bytes()[4], b'-');
        assert_eq!(t.as_bytes()[7], b'-');
    }

    #[test]
    fn make_period_id_single_day() {
        assert_eq!(make_period_id("2026-02-06", "2026-02-06"), "2026-02-06");
    }

    #[test]
    fn make_period_id_range() {
        assert_eq!(
            make_period_id("2026-02-01", "2026-02-06"),
            "2026-02-01..2026-02-06"
        );
    }

    #[test]
    fn period_id_round_trips() {
        for period in ["2026-02-06", "2026-02-01..2026-02-06"] {
            let end = period_end_date(period);
            let start = period.split_once("..").map(|(s, _)| s).unwrap_or(period);
            assert_eq!(make_period_id(start, end), period);
        }
    }

    #[test]
    fn format_single_day() {
        assert_eq!(format_period_display("2026-02-06"), "Feb 06, 2026");
    }

    #[test]
    fn format_range_shows_end_year_only() {
        assert_eq!(
            format_period_display("2026-02-01..2026-02-06"),
            "Feb 01 - Feb 06, 2026"
        );
    }

    #[test]
    fn format_passes_through_garbage() {
        assert_eq!(format_period_display("not-a-date"), "not-a-date");
    }

    #[test]
    fn end_date_of_range() {
        assert_eq!(period_end_date("2026-02-01..2026-02-06"), "2026-02-06");
        assert_eq!(period_end_date("2026-02-06"), "2026-02-06");
    }
}
