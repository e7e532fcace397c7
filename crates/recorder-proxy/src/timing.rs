//! Time arithmetic behind the start, stop and resume routes.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Session;

/// Recording length used by "start" when the vendor reports none.
pub const DEFAULT_DURATION_SECS: f64 = 3600.0;

/// Which instant the duration is added to when a session is started early.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartBaseline {
    /// Keep the originally scheduled end: original start + duration
    #[default]
    OriginalStart,
    /// Run for the full duration from the moment of starting
    Now,
}

impl std::str::FromStr for StartBaseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original_start" => Ok(StartBaseline::OriginalStart),
            "now" => Ok(StartBaseline::Now),
            other => Err(format!("unknown start baseline '{}'", other)),
        }
    }
}

/// Accepts RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `base` moved by `secs` seconds (millisecond precision); `None` when the
/// result falls outside the representable range.
pub fn offset_by_secs(base: DateTime<Utc>, secs: f64) -> Option<DateTime<Utc>> {
    let millis = Duration::try_milliseconds((secs * 1000.0).round() as i64)?;
    base.checked_add_signed(millis)
}

/// New `(start, end)` for starting `session` at `now`; `None` when the
/// reported duration does not fit a timestamp.
pub fn start_window(
    session: &Session,
    now: DateTime<Utc>,
    baseline: StartBaseline,
    default_duration_secs: f64,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let base = match baseline {
        StartBaseline::OriginalStart => session.start_time.unwrap_or(now),
        StartBaseline::Now => now,
    };
    let end = offset_by_secs(base, session.duration.unwrap_or(default_duration_secs))?;
    Some((now, end))
}

/// New `(start, end)` for stopping `session` at `now`; `None` without a start time.
pub fn stop_window(session: &Session, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    session.start_time.map(|start| (start, now))
}

/// Whole seconds between pausing and resuming, never less than one.
pub fn pause_duration_secs(pause_started: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - pause_started).num_milliseconds();
    let secs = (millis as f64 / 1000.0).round() as i64;
    secs.max(1)
}

pub fn starts_on(session: &Session, day: NaiveDate) -> bool {
    session
        .start_time
        .map(|start| start.date_naive() == day)
        .unwrap_or(false)
}

/// Keeps only sessions starting on the UTC calendar day of `now`.
pub fn sessions_for_day(sessions: Vec<Session>, now: DateTime<Utc>) -> Vec<Session> {
    let today = now.date_naive();
    sessions.into_iter().filter(|s| starts_on(s, today)).collect()
}
