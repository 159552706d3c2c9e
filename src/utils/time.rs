use crate::error::{invalid_input, AppResult};
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse time string in HH:MM format
pub fn parse_time(time_str: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let hour = parts[0].parse::<u32>().ok()?;
    let minute = parts[1].parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Parse a calendar date in YYYY-MM-DD format
pub fn parse_date(date_str: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|e| invalid_input(&format!("Invalid date '{}': {}", date_str, e)))
}

/// Resolve a wall-clock time in `tz` to a UTC instant.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times that
/// do not exist (DST spring-forward) are rejected.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> AppResult<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(invalid_input(&format!(
            "Local time {} does not exist in {}",
            naive, tz
        ))),
    }
}

/// The instant `date` at `time_str` (HH:MM) in `tz`
pub fn at_time_of_day(date: NaiveDate, time_str: &str, tz: Tz) -> AppResult<DateTime<Utc>> {
    let (hour, minute) = parse_time(time_str)
        .ok_or_else(|| invalid_input(&format!("Invalid time '{}', expected HH:MM", time_str)))?;
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| invalid_input("Failed to create datetime"))?;
    resolve_local(tz, naive)
}

/// Whole minutes from `start` to `end`
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    end.signed_duration_since(start).num_minutes()
}
