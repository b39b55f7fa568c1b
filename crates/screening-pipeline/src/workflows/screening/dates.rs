use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::domain::LegacyDate;

/// Character some exports prepend to timestamps to stop spreadsheets reformatting them.
const STRAY_MARKER: char = '!';

/// Largest serial day count we accept (roughly year 29000); anything beyond is garbage.
const MAX_SERIAL_DAYS: f64 = 10_000_000.0;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Resolve either date encoding to an instant. Unparsable input is absent, never an error.
pub fn parse_legacy_date(value: &LegacyDate) -> Option<DateTime<Utc>> {
    match value {
        LegacyDate::Serial(days) => from_serial_days(*days),
        LegacyDate::Text(text) => parse_timestamp(text),
    }
}

fn from_serial_days(days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() || days.abs() > MAX_SERIAL_DAYS {
        return None;
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let offset = Duration::milliseconds((days * 86_400_000.0).round() as i64);
    epoch
        .checked_add_signed(offset)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned: String = raw.chars().filter(|c| *c != STRAY_MARKER).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Fractional hours elapsed from `then` to `now` (negative when `then` is in the future).
pub fn hours_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 3_600_000.0
}

pub fn days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    hours_between(then, now) / 24.0
}
