//! This module handles conversion between iCal text and the JSCalendar-shaped internal representations
//!
//! It is a wrapper around different Rust third-party libraries, since I haven't found any complete library that is able to parse _and_ generate iCal files:
//! parsing uses `ical`, generation uses `ics`.
//!
//! Both directions are pure functions: no I/O, deterministic for identical input, inputs never mutated.
//! The field-by-field mapping (and its documented losses) lives in [`parser`] and [`builder`].

mod parser;
pub use parser::parse;
pub use parser::parse_task;
mod builder;
pub use builder::build_from;
pub use builder::build_from_task;
pub use builder::build_from_task_with_timestamp;
pub use builder::build_from_with_timestamp;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::config::{ORG_NAME, PRODUCT_NAME};
use crate::error::{Error, Result};

pub fn default_prod_id() -> String {
    format!(
        "-//{}//{}//EN",
        ORG_NAME.lock().unwrap(),
        PRODUCT_NAME.lock().unwrap()
    )
}

/// The local date-time layout used on the JSON side (`2026-01-15T10:00:00`)
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// The date-time layout used on the iCal side (`20260115T100000`)
const ICAL_FORMAT: &str = "%Y%m%dT%H%M%S";
const ICAL_DATE_FORMAT: &str = "%Y%m%d";

/// A DATE or DATE-TIME property value, split into the JSCalendar triplet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IcalDateTime {
    /// Local date-time string, `T00:00:00`-padded for bare dates
    pub local: String,
    /// `Etc/UTC` for `Z`-suffixed values, the raw `TZID` otherwise, `None` when floating
    pub time_zone: Option<String>,
    pub date_only: bool,
}

pub(crate) fn parse_local(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, LOCAL_FORMAT)
        .map_err(|err| Error::Ical(format!("invalid local date-time {:?}: {}", s, err)))
}

pub(crate) fn format_local(dt: &NaiveDateTime) -> String {
    dt.format(LOCAL_FORMAT).to_string()
}

/// Interpret an iCal DATE or DATE-TIME value together with its `TZID`/`VALUE` parameters.
///
/// A `TZID` that is not an IANA name is carried through verbatim: remapping it
/// silently would be worse than handing the consumer the original identifier.
pub(crate) fn read_ical_datetime(
    raw: &str,
    tzid: Option<&str>,
    value_is_date: bool,
) -> Result<IcalDateTime> {
    let raw = raw.trim();
    let date_only = value_is_date || !raw.contains('T');

    if date_only {
        let date = NaiveDate::parse_from_str(raw, ICAL_DATE_FORMAT)
            .map_err(|err| Error::Ical(format!("invalid iCal date {:?}: {}", raw, err)))?;
        return Ok(IcalDateTime {
            local: format!("{}{}", date.format("%Y-%m-%d"), crate::event::ALL_DAY_SENTINEL_TIME),
            time_zone: tzid.map(|t| t.to_string()),
            date_only: true,
        });
    }

    let is_utc = raw.ends_with('Z');
    let bare = if is_utc { &raw[..raw.len() - 1] } else { raw };
    let dt = NaiveDateTime::parse_from_str(bare, ICAL_FORMAT)
        .map_err(|err| Error::Ical(format!("invalid iCal date-time {:?}: {}", raw, err)))?;

    let time_zone = if is_utc {
        Some("Etc/UTC".to_string())
    } else {
        tzid.map(|t| t.to_string())
    };

    Ok(IcalDateTime {
        local: format_local(&dt),
        time_zone,
        date_only: false,
    })
}

/// Format a local date-time string back into an iCal DATE-TIME value.
pub(crate) fn ical_datetime(local: &str, utc: bool) -> Result<String> {
    let dt = parse_local(local)?;
    let mut out = dt.format(ICAL_FORMAT).to_string();
    if utc {
        out.push('Z');
    }
    Ok(out)
}

/// Format a local date-time string back into an iCal DATE value (the time part is dropped).
pub(crate) fn ical_date(local: &str) -> Result<String> {
    let dt = parse_local(local)?;
    Ok(dt.format(ICAL_DATE_FORMAT).to_string())
}

/// Whether a `timeZone` value means UTC (and should be written with a `Z` suffix).
pub(crate) fn is_utc_zone(zone: &str) -> bool {
    matches!(zone, "Etc/UTC" | "UTC" | "Etc/GMT")
}

/// iCal UTC date-time (`20260115T094500Z`) → JSON UTC date-time (`2026-01-15T09:45:00Z`).
pub(crate) fn read_utc_datetime(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let bare = raw.strip_suffix('Z').unwrap_or(raw);
    let dt = NaiveDateTime::parse_from_str(bare, ICAL_FORMAT)
        .map_err(|err| Error::Ical(format!("invalid UTC date-time {:?}: {}", raw, err)))?;
    Ok(format!("{}Z", format_local(&dt)))
}

/// JSON UTC date-time → iCal UTC date-time.
pub(crate) fn utc_to_ical(s: &str) -> Result<String> {
    let bare = s.strip_suffix('Z').unwrap_or(s);
    let dt = parse_local(bare)?;
    Ok(format!("{}Z", dt.format(ICAL_FORMAT)))
}

/// Parse the ISO-8601 duration subset both formats share: `±P[nW][nD][T[nH][nM][n[.f]S]]`.
///
/// Fractional seconds are truncated (not rounded) toward zero: once a duration is
/// turned back into concrete instants, sub-second precision is gone by contract.
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let err = || Error::Ical(format!("invalid duration {:?}", s));

    let mut chars = s.chars().peekable();
    let negative = match chars.peek() {
        Some('-') => {
            chars.next();
            true
        }
        Some('+') => {
            chars.next();
            false
        }
        _ => false,
    };
    if chars.next() != Some('P') {
        return Err(err());
    }

    let mut seconds: i64 = 0;
    let mut in_time = false;
    let mut digits = String::new();
    let mut seen_component = false;

    for c in chars {
        match c {
            'T' => {
                if !digits.is_empty() {
                    return Err(err());
                }
                in_time = true;
            }
            '0'..='9' | '.' => digits.push(c),
            'W' | 'D' | 'H' | 'M' | 'S' => {
                if digits.is_empty() {
                    return Err(err());
                }
                // Only the seconds component may carry a fraction, which we truncate
                let value: i64 = if c == 'S' {
                    digits
                        .split('.')
                        .next()
                        .unwrap_or("0")
                        .parse()
                        .map_err(|_| err())?
                } else {
                    digits.parse().map_err(|_| err())?
                };
                digits.clear();
                seen_component = true;
                let factor = match (c, in_time) {
                    ('W', false) => 7 * 86_400,
                    ('D', false) => 86_400,
                    ('H', true) => 3_600,
                    ('M', true) => 60,
                    ('S', true) => 1,
                    _ => return Err(err()),
                };
                seconds += value * factor;
            }
            _ => return Err(err()),
        }
    }
    if !digits.is_empty() || !seen_component {
        return Err(err());
    }

    Ok(Duration::seconds(if negative { -seconds } else { seconds }))
}

/// Format a duration in the same ISO-8601 subset. Whole weeks are written as days.
pub(crate) fn format_duration(duration: &Duration) -> String {
    let mut total = duration.num_seconds();
    let mut out = String::new();
    if total < 0 {
        out.push('-');
        total = -total;
    }
    out.push('P');

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;

    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || secs > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if secs > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{}S", secs));
        }
    }
    out
}

/// Undo RFC 5545 TEXT escaping (`\\n`, `\\,`, `\\;`, `\\\\`).
pub(crate) fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a multi-valued TEXT property (e.g. `CATEGORIES`) on its unescaped commas.
pub(crate) fn split_unescaped_commas(s: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            values.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    values.push(current);
    values.retain(|v| !v.is_empty());
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_ical_datetime() {
        let utc = read_ical_datetime("20260115T100000Z", None, false).unwrap();
        assert_eq!(utc.local, "2026-01-15T10:00:00");
        assert_eq!(utc.time_zone.as_deref(), Some("Etc/UTC"));
        assert!(!utc.date_only);

        let zoned = read_ical_datetime("20260115T100000", Some("Europe/Paris"), false).unwrap();
        assert_eq!(zoned.local, "2026-01-15T10:00:00");
        assert_eq!(zoned.time_zone.as_deref(), Some("Europe/Paris"));

        // Windows-style names are not remapped, they pass through untouched
        let opaque =
            read_ical_datetime("20260115T100000", Some("W. Europe Standard Time"), false).unwrap();
        assert_eq!(opaque.time_zone.as_deref(), Some("W. Europe Standard Time"));

        let floating = read_ical_datetime("20260115T100000", None, false).unwrap();
        assert_eq!(floating.time_zone, None);

        let date = read_ical_datetime("20260115", None, true).unwrap();
        assert_eq!(date.local, "2026-01-15T00:00:00");
        assert!(date.date_only);
    }

    #[test]
    fn test_ical_datetime_roundtrip() {
        assert_eq!(ical_datetime("2026-01-15T10:00:00", true).unwrap(), "20260115T100000Z");
        assert_eq!(ical_datetime("2026-01-15T10:00:00", false).unwrap(), "20260115T100000");
        assert_eq!(ical_date("2026-01-15T00:00:00").unwrap(), "20260115");
        assert!(ical_datetime("not a date", false).is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("PT1H").unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("P1D").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("P2W").unwrap(), Duration::days(14));
        assert_eq!(
            parse_duration("P1DT2H30M5S").unwrap(),
            Duration::seconds(86_400 + 2 * 3_600 + 30 * 60 + 5)
        );
        assert_eq!(parse_duration("-PT15M").unwrap(), Duration::minutes(-15));
        assert!(parse_duration("PT").is_err());
        assert!(parse_duration("1H").is_err());
    }

    #[test]
    fn test_fractional_seconds_truncate() {
        assert_eq!(parse_duration("PT1.9S").unwrap(), Duration::seconds(1));
        assert_eq!(parse_duration("PT0.5S").unwrap(), Duration::seconds(0));
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(&Duration::hours(1)), "PT1H");
        assert_eq!(format_duration(&Duration::days(1)), "P1D");
        assert_eq!(format_duration(&Duration::seconds(0)), "PT0S");
        assert_eq!(
            format_duration(&Duration::seconds(86_400 + 2 * 3_600 + 30 * 60 + 5)),
            "P1DT2H30M5S"
        );
        assert_eq!(format_duration(&Duration::minutes(-15)), "-PT15M");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(unescape_text("a\\, b\\; c\\nnew\\\\line"), "a, b; c\nnew\\line");
        assert_eq!(
            split_unescaped_commas("MEETING,IMPORTANT\\, REALLY,WORK"),
            vec!["MEETING", "IMPORTANT\\, REALLY", "WORK"]
        );
    }
}
