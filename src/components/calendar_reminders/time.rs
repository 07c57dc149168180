use super::models::CalendarEvent;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Why an event start could not be turned into an instant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("event has no start date")]
    MissingDate,
    #[error("invalid start date '{0}'")]
    InvalidDate(String),
    #[error("invalid start time '{0}'")]
    InvalidTime(String),
    /// The local time falls into a DST gap
    #[error("start time does not exist in timezone")]
    NonexistentLocalTime,
}

/// Parse time string in HH:MM or HH:MM:SS format
pub fn parse_time(time_str: &str) -> Option<NaiveTime> {
    let time_str = time_str.trim();
    NaiveTime::parse_from_str(time_str, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time_str, "%H:%M:%S"))
        .ok()
}

/// Instant an event starts, from its calendar-local date and time.
///
/// A missing start time means midnight. Ambiguous local times (DST fall-back)
/// resolve to the earlier instant.
pub fn event_start_instant(event: &CalendarEvent, tz: Tz) -> Result<DateTime<Utc>, StartError> {
    let date_str = event.start_date.as_deref().ok_or(StartError::MissingDate)?;
    let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|_| StartError::InvalidDate(date_str.to_string()))?;

    let time = match event.start_time.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(t) => parse_time(t).ok_or_else(|| StartError::InvalidTime(t.to_string()))?,
        None => NaiveTime::default(),
    };

    let local = date.and_time(time);
    match tz.from_local_datetime(&local) {
        chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        chrono::LocalResult::None => Err(StartError::NonexistentLocalTime),
    }
}

/// Whether a reminder is due at `now`.
///
/// The due window is `[start - offset, start - offset + poll_interval)`. A
/// zero offset is the parser's "invalid" signal and is never due. A tick that
/// runs later than one poll interval after the window opened misses it for good.
pub fn is_due(
    event_start: DateTime<Utc>,
    offset_ms: u64,
    now: DateTime<Utc>,
    poll_interval: Duration,
) -> bool {
    if offset_ms == 0 {
        return false;
    }
    let Ok(offset_ms) = i64::try_from(offset_ms) else {
        return false;
    };
    let Some(due) = event_start.checked_sub_signed(Duration::milliseconds(offset_ms)) else {
        return false;
    };
    let Some(window_end) = due.checked_add_signed(poll_interval) else {
        return false;
    };
    now >= due && now < window_end
}
