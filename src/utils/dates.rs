use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Local, NaiveDate};

pub const DATE_FMT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` argument, defaulting to today.
pub fn resolve_date(date_str: Option<&str>) -> Result<NaiveDate> {
    match date_str {
        Some(s) => NaiveDate::parse_from_str(s.trim(), DATE_FMT)
            .with_context(|| format!("Invalid date (expected YYYY-MM-DD): {}", s)),
        None => Ok(Local::now().date_naive()),
    }
}

pub fn date_str(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

/// The `past_days` dates ending at `end` (inclusive), oldest first.
pub fn past_dates(end: NaiveDate, past_days: u32) -> Vec<NaiveDate> {
    (0..past_days)
        .rev()
        .map(|i| end - Duration::days(i as i64))
        .collect()
}

pub fn iso_week(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_date() {
        let d = resolve_date(Some("2026-08-06")).unwrap();
        assert_eq!(date_str(d), "2026-08-06");
        assert!(resolve_date(Some("08/06/2026")).is_err());
    }

    #[test]
    fn test_past_dates_window() {
        let end = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let dates = past_dates(end, 7);
        assert_eq!(dates.len(), 7);
        assert_eq!(date_str(dates[0]), "2026-07-31");
        assert_eq!(date_str(dates[6]), "2026-08-06");
    }
}
