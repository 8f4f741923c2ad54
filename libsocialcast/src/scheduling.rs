//! Schedule time parsing
//!
//! Accepted forms, tried in order:
//! - `YYYY-MM-DD HH:MM`, read as UTC
//! - RFC 3339: `2025-11-20T15:00:00+01:00`
//! - Relative durations: `30m`, `2h`, `1day 3h`
//! - Natural language: `tomorrow 3pm`, `next monday 10am`

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::{Result, SocialcastError};

const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a schedule string into an absolute time, relative to `now`
///
/// # Errors
///
/// Returns `InvalidInput` if no supported format matches.
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, MINUTE_FORMAT) {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(duration) = parse_duration(input) {
        return now.checked_add_signed(duration).ok_or_else(|| {
            SocialcastError::InvalidInput(format!("Schedule '{}' is too far in the future", input))
        });
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).map_err(|_| {
        SocialcastError::InvalidInput(format!(
            "Could not parse schedule '{}'. Use YYYY-MM-DD HH:MM (UTC), a duration like 2h, or e.g. 'tomorrow 3pm'",
            input
        ))
    })
}

/// Like [`parse_schedule`], but the result must lie after `now`
pub fn parse_future_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let at = parse_schedule(input, now)?;
    if at <= now {
        return Err(SocialcastError::InvalidInput(format!(
            "Scheduled time {} is not in the future",
            at.format(MINUTE_FORMAT)
        )));
    }
    Ok(at)
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| SocialcastError::InvalidInput(format!("Could not parse duration: {}", e)))?;
    Duration::from_std(std_duration)
        .map_err(|_| SocialcastError::InvalidInput("Duration out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_minute_format_is_utc() {
        let at = parse_schedule("2025-11-21 15:30", now()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 11, 21, 15, 30, 0).unwrap());
    }

    #[test]
    fn test_rfc3339_with_offset() {
        let at = parse_schedule("2025-11-21T15:30:00+02:00", now()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 11, 21, 13, 30, 0).unwrap());
    }

    #[test]
    fn test_relative_durations() {
        assert_eq!(
            parse_schedule("2h", now()).unwrap(),
            now() + Duration::hours(2)
        );
        assert_eq!(
            parse_schedule("30m", now()).unwrap(),
            now() + Duration::minutes(30)
        );
        assert_eq!(
            parse_schedule("1day 3h", now()).unwrap(),
            now() + Duration::hours(27)
        );
    }

    #[test]
    fn test_natural_language() {
        let at = parse_schedule("tomorrow", now()).unwrap();
        assert!(at > now());
        assert!(at <= now() + Duration::days(2));
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(
            parse_schedule("  2h \n", now()).unwrap(),
            now() + Duration::hours(2)
        );
    }

    #[test]
    fn test_empty_and_garbage_rejected() {
        assert!(matches!(
            parse_schedule("", now()),
            Err(SocialcastError::InvalidInput(_))
        ));
        match parse_schedule("whenever you like", now()) {
            Err(SocialcastError::InvalidInput(msg)) => assert!(msg.contains("whenever")),
            other => panic!("Expected invalid input, got {:?}", other),
        }
    }

    #[test]
    fn test_future_schedule_rejects_past_and_present() {
        assert!(parse_future_schedule("2025-11-20 11:59", now()).is_err());
        assert!(parse_future_schedule("2025-11-20 12:00", now()).is_err());
        assert!(parse_future_schedule("2025-11-20 12:01", now()).is_ok());
        assert!(parse_future_schedule("5m", now()).is_ok());
    }

    #[test]
    fn test_duration_past_calendar_range_rejected() {
        match parse_future_schedule("1000000years", now()) {
            Err(SocialcastError::InvalidInput(msg)) => assert!(msg.contains("too far")),
            other => panic!("Expected invalid input, got {:?}", other),
        }
    }
}
