//! 14-digit datestamp handling.
//!
//! Datestamps are `YYYYMMDDhhmmss` strings. Shorter all-digit inputs are
//! padded with trailing zeros; anything else is rejected.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Canonical datestamp length.
pub const DATESTAMP_LENGTH: usize = 14;

static DATESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{14}$").expect("datestamp pattern compiles"));

/// Error produced by datestamp parsing or arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatestampError {
    /// Input is not a digit string of at most 14 characters.
    #[error("invalid datestamp: {0:?}")]
    Invalid(String),
    /// Digit string does not encode a real calendar date/time.
    #[error("datestamp {0:?} is not a valid calendar date")]
    OutOfRange(String),
    /// Hour increment is not an integer.
    #[error("invalid hour increment: {0:?}")]
    BadHour(String),
    /// Time delta is not of the form `[+-]HH:MM[:SS]`.
    #[error("invalid time delta: {0:?}")]
    BadDelta(String),
}

/// Pad an all-digit datestamp with trailing zeros up to 14 characters.
pub fn pad_datestamp(input: &str) -> Result<String, DatestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || trimmed.len() > DATESTAMP_LENGTH
        || !trimmed.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(DatestampError::Invalid(input.to_string()));
    }
    let mut padded = trimmed.to_string();
    while padded.len() < DATESTAMP_LENGTH {
        padded.push('0');
    }
    Ok(padded)
}

/// Two-digit hour component of a full datestamp.
pub fn hour_of(datestamp: &str) -> Result<&str, DatestampError> {
    if !DATESTAMP_RE.is_match(datestamp) {
        return Err(DatestampError::Invalid(datestamp.to_string()));
    }
    Ok(&datestamp[8..10])
}

/// Day of week of a full datestamp, 0=Sunday..6=Saturday.
pub fn day_of_week(datestamp: &str) -> Result<u32, DatestampError> {
    let parsed = parse(datestamp)?;
    Ok(parsed.date().weekday().num_days_from_sunday())
}

/// Increment a datestamp by an hour count and an optional `[+-]HH:MM[:SS]`
/// delta. Empty increments are treated as zero.
pub fn increment_datestamp(
    datestamp: &str,
    hour: &str,
    time_delta: &str,
) -> Result<String, DatestampError> {
    let mut moment = parse(datestamp)?;
    let hour = hour.trim();
    if !hour.is_empty() {
        let hours: i64 = hour
            .parse()
            .map_err(|_| DatestampError::BadHour(hour.to_string()))?;
        moment += Duration::hours(hours);
    }
    let delta = time_delta.trim();
    if !delta.is_empty() {
        moment += parse_delta(delta)?;
    }
    Ok(moment.format("%Y%m%d%H%M%S").to_string())
}

fn parse(datestamp: &str) -> Result<NaiveDateTime, DatestampError> {
    if !DATESTAMP_RE.is_match(datestamp) {
        return Err(DatestampError::Invalid(datestamp.to_string()));
    }
    let year: i32 = datestamp[0..4].parse().expect("digits");
    let month: u32 = datestamp[4..6].parse().expect("digits");
    let day: u32 = datestamp[6..8].parse().expect("digits");
    let hour: u32 = datestamp[8..10].parse().expect("digits");
    let minute: u32 = datestamp[10..12].parse().expect("digits");
    let second: u32 = datestamp[12..14].parse().expect("digits");
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| DatestampError::OutOfRange(datestamp.to_string()))
}

fn parse_delta(delta: &str) -> Result<Duration, DatestampError> {
    let (sign, body) = match delta.as_bytes().first() {
        Some(b'-') => (-1i64, &delta[1..]),
        Some(b'+') => (1i64, &delta[1..]),
        _ => (1i64, delta),
    };
    let mut parts = body.split(':');
    let hours: i64 = next_component(&mut parts, delta)?;
    let minutes: i64 = next_component(&mut parts, delta)?;
    let seconds: i64 = match parts.next() {
        Some(part) => part
            .parse()
            .map_err(|_| DatestampError::BadDelta(delta.to_string()))?,
        None => 0,
    };
    if parts.next().is_some() {
        return Err(DatestampError::BadDelta(delta.to_string()));
    }
    Ok(Duration::seconds(
        sign * (hours * 3600 + minutes * 60 + seconds),
    ))
}

fn next_component(
    parts: &mut std::str::Split<'_, char>,
    delta: &str,
) -> Result<i64, DatestampError> {
    parts
        .next()
        .ok_or_else(|| DatestampError::BadDelta(delta.to_string()))?
        .parse()
        .map_err(|_| DatestampError::BadDelta(delta.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_datestamp_with_zeros() {
        assert_eq!(pad_datestamp("2008053000").unwrap(), "20080530000000");
        assert_eq!(pad_datestamp("20160102030405").unwrap(), "20160102030405");
    }

    #[test]
    fn rejects_non_digit_datestamp() {
        assert!(pad_datestamp("2016-01-02").is_err());
        assert!(pad_datestamp("").is_err());
        assert!(pad_datestamp("201601020304055").is_err());
    }

    #[test]
    fn increments_by_hours() {
        assert_eq!(
            increment_datestamp("20160102030405", "03", "").unwrap(),
            "20160102060405"
        );
    }

    #[test]
    fn increments_across_day_boundary() {
        assert_eq!(
            increment_datestamp("20160102230000", "2", "").unwrap(),
            "20160103010000"
        );
    }

    #[test]
    fn applies_negative_time_delta() {
        assert_eq!(
            increment_datestamp("20160102030405", "", "-01:00:00").unwrap(),
            "20160102020405"
        );
        assert_eq!(
            increment_datestamp("20160102030405", "1", "00:30").unwrap(),
            "20160102043405"
        );
    }

    #[test]
    fn rejects_malformed_delta() {
        assert!(increment_datestamp("20160102030405", "", "abc").is_err());
        assert!(increment_datestamp("20160102030405", "", "1:2:3:4").is_err());
    }

    #[test]
    fn day_of_week_is_civil() {
        // 2016-01-02 was a Saturday.
        assert_eq!(day_of_week("20160102030405").unwrap(), 6);
        // 2016-01-03 was a Sunday.
        assert_eq!(day_of_week("20160103000000").unwrap(), 0);
    }

    #[test]
    fn hour_component() {
        assert_eq!(hour_of("20160102030405").unwrap(), "03");
        assert_eq!(hour_of("20160102120000").unwrap(), "12");
    }

    #[test]
    fn hour_component_rejects_partial_datestamps() {
        assert!(hour_of("2016010").is_err());
        assert!(hour_of("").is_err());
        assert!(hour_of("2016-01-02T03:04").is_err());
    }
}
