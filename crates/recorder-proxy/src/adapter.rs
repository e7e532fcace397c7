//! Recorder and session operations on top of the vendor session.
//!
//! Every operation has the same shape: make sure the vendor session is up, stamp
//! the cached identity on exactly one vendor call, and map the result onto a
//! plain return value. Vendor errors never escape; they become the operation's
//! failure sentinel (`"Error"`, `None`, an empty list or `false`). Each operation
//! reports its outcome once, through [`RecorderAdapter::finish`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::VendorError;
use crate::metrics::ProxyMetrics;
use crate::model::{AuthIdentity, ScheduleRequest, Session};
use crate::session::VendorSession;
use crate::vendor::VendorApi;

pub const UNKNOWN_STATE: &str = "Unknown";
pub const ERROR_STATE: &str = "Error";

enum Outcome {
    Ok,
    /// The call succeeded but found nothing
    Empty,
    NotLoggedIn,
    Failed(VendorError),
    /// The vendor answered with something unusable
    Rejected(String),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Empty => "empty",
            Outcome::NotLoggedIn => "not_logged_in",
            Outcome::Failed(_) => "failed",
            Outcome::Rejected(_) => "rejected",
        }
    }
}

/// Strips the surrounding quotes from a pause response and parses the id.
pub fn parse_pause_id(body: &str) -> Option<Uuid> {
    Uuid::parse_str(body.trim().trim_matches('"')).ok()
}

/// Reads `SessionPublicId` (any letter case) from a metadata document.
pub fn parse_session_public_id(body: &str) -> Option<Uuid> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("SessionPublicId"))
        .and_then(|(_, v)| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub struct RecorderAdapter {
    api: Arc<dyn VendorApi>,
    session: VendorSession,
    metrics: Arc<ProxyMetrics>,
}

impl RecorderAdapter {
    pub fn new(api: Arc<dyn VendorApi>, user_key: String, password: String, metrics: Arc<ProxyMetrics>) -> Self {
        let session = VendorSession::new(Arc::clone(&api), user_key, password, Arc::clone(&metrics));
        Self { api, session, metrics }
    }

    pub fn vendor_session(&self) -> &VendorSession {
        &self.session
    }

    async fn identity(&self) -> Option<AuthIdentity> {
        if !self.session.ensure_logged_in().await {
            return None;
        }
        self.session.identity().await
    }

    fn finish(&self, operation: &'static str, outcome: Outcome, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let label = outcome.label();
        self.metrics.record_operation(operation, label);

        match outcome {
            Outcome::Ok | Outcome::Empty => {
                debug!(operation, outcome = label, elapsed_ms, "vendor operation finished");
            }
            Outcome::NotLoggedIn => {
                warn!(operation, outcome = label, elapsed_ms, "vendor operation skipped: not logged in");
            }
            Outcome::Failed(e) => {
                warn!(operation, outcome = label, elapsed_ms, error = %e, "vendor operation failed");
            }
            Outcome::Rejected(reason) => {
                warn!(operation, outcome = label, elapsed_ms, reason = %reason, "vendor operation failed");
            }
        }
    }

    /// State of one recorder as a display string; never fails the request.
    pub async fn recorder_state(&self, recorder_id: Uuid) -> String {
        let started = Instant::now();
        let (outcome, state) = match self.identity().await {
            None => (Outcome::NotLoggedIn, ERROR_STATE.to_string()),
            Some(auth) => match self.api.get_remote_recorders_by_id(&auth, &[recorder_id]).await {
                Ok(recorders) => match recorders.into_iter().find(|r| r.id == recorder_id) {
                    Some(recorder) => (Outcome::Ok, recorder.state),
                    None => (Outcome::Empty, UNKNOWN_STATE.to_string()),
                },
                Err(e) => (Outcome::Failed(e), ERROR_STATE.to_string()),
            },
        };
        self.finish("recorder_state", outcome, started);
        state
    }

    /// Every session scheduled on a recorder, unfiltered. Empty on any failure.
    pub async fn recorder_sessions(&self, recorder_id: Uuid) -> Vec<Session> {
        let started = Instant::now();
        let (outcome, sessions) = match self.identity().await {
            None => (Outcome::NotLoggedIn, Vec::new()),
            Some(auth) => match self.api.get_remote_recorders_by_id(&auth, &[recorder_id]).await {
                Err(e) => (Outcome::Failed(e), Vec::new()),
                Ok(recorders) => {
                    let scheduled = recorders
                        .into_iter()
                        .find(|r| r.id == recorder_id)
                        .map(|r| r.scheduled_recordings)
                        .unwrap_or_default();
                    if scheduled.is_empty() {
                        (Outcome::Empty, Vec::new())
                    } else {
                        match self.api.get_sessions_by_id(&auth, &scheduled).await {
                            Ok(sessions) => (Outcome::Ok, sessions),
                            Err(e) => (Outcome::Failed(e), Vec::new()),
                        }
                    }
                }
            },
        };
        self.finish("recorder_sessions", outcome, started);
        sessions
    }

    /// Batched detail lookup; `None` when nothing resolves or the call fails.
    pub async fn sessions_by_id(&self, ids: &[Uuid]) -> Option<Vec<Session>> {
        let started = Instant::now();
        if ids.is_empty() {
            self.finish("sessions_by_id", Outcome::Empty, started);
            return None;
        }
        let (outcome, sessions) = match self.identity().await {
            None => (Outcome::NotLoggedIn, None),
            Some(auth) => match self.api.get_sessions_by_id(&auth, ids).await {
                Ok(sessions) if sessions.is_empty() => (Outcome::Empty, None),
                Ok(sessions) => (Outcome::Ok, Some(sessions)),
                Err(e) => (Outcome::Failed(e), None),
            },
        };
        self.finish("sessions_by_id", outcome, started);
        sessions
    }

    pub async fn session(&self, id: Uuid) -> Option<Session> {
        self.sessions_by_id(&[id])
            .await
            .and_then(|sessions| sessions.into_iter().find(|s| s.id == id))
    }

    /// Pushes a new recording window; `true` only if the vendor accepted it.
    pub async fn update_session_time(&self, session_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let started = Instant::now();
        let outcome = match self.identity().await {
            None => Outcome::NotLoggedIn,
            Some(auth) => match self.api.update_recording_time(&auth, session_id, start, end).await {
                Ok(()) => Outcome::Ok,
                Err(e) => Outcome::Failed(e),
            },
        };
        let success = matches!(outcome, Outcome::Ok);
        self.finish("update_session_time", outcome, started);
        success
    }

    /// Schedules a one-off recording; returns the first created session id.
    pub async fn create_recording(
        &self,
        recorder_id: Uuid,
        name: &str,
        start: DateTime<Utc>,
        duration: Duration,
        folder_id: Uuid,
    ) -> Option<Uuid> {
        let started = Instant::now();
        let Some(end) = start.checked_add_signed(duration) else {
            self.finish("create_recording", Outcome::Rejected("end time out of range".into()), started);
            return None;
        };
        let request = ScheduleRequest {
            recorder_id,
            name: name.to_string(),
            folder_id,
            start,
            end,
            is_broadcast: false,
        };
        let (outcome, created) = match self.identity().await {
            None => (Outcome::NotLoggedIn, None),
            Some(auth) => match self.api.schedule_recording(&auth, &request).await {
                Ok(ids) => match ids.first() {
                    Some(id) => (Outcome::Ok, Some(*id)),
                    None => (Outcome::Empty, None),
                },
                Err(e) => (Outcome::Failed(e), None),
            },
        };
        self.finish("create_recording", outcome, started);
        created
    }

    /// Internal session id behind a public delivery id.
    pub async fn session_public_id(&self, delivery_id: Uuid) -> Option<Uuid> {
        let started = Instant::now();
        let (outcome, id) = match self.identity().await {
            None => (Outcome::NotLoggedIn, None),
            Some(_) => match self.api.get_delivery_metadata(delivery_id).await {
                Ok(response) if !response.is_success() => {
                    (Outcome::Rejected(format!("status {}", response.status)), None)
                }
                Ok(response) => match parse_session_public_id(&response.body) {
                    Some(id) => (Outcome::Ok, Some(id)),
                    None => (Outcome::Rejected("no SessionPublicId in metadata".into()), None),
                },
                Err(e) => (Outcome::Failed(e), None),
            },
        };
        self.finish("session_public_id", outcome, started);
        id
    }

    /// Pauses a live recording and returns the pause ticket.
    pub async fn pause_session(&self, session_id: Uuid) -> Option<Uuid> {
        let started = Instant::now();
        let (outcome, pause_id) = match self.identity().await {
            None => (Outcome::NotLoggedIn, None),
            Some(_) => match self.api.pause_session(session_id).await {
                Ok(response) if !response.is_success() => {
                    (Outcome::Rejected(format!("status {}", response.status)), None)
                }
                Ok(response) => match parse_pause_id(&response.body) {
                    Some(id) => (Outcome::Ok, Some(id)),
                    None => (Outcome::Rejected(format!("unparsable pause id {:?}", response.body)), None),
                },
                Err(e) => (Outcome::Failed(e), None),
            },
        };
        self.finish("pause_session", outcome, started);
        pause_id
    }

    /// Reports how long a pause lasted; `true` iff the vendor answered 2xx.
    pub async fn set_pause_duration(&self, session_id: Uuid, pause_id: Uuid, duration_secs: i64) -> bool {
        let started = Instant::now();
        let outcome = match self.identity().await {
            None => Outcome::NotLoggedIn,
            Some(_) => match self.api.set_pause_duration(session_id, pause_id, duration_secs).await {
                Ok(response) if response.is_success() => Outcome::Ok,
                Ok(response) => Outcome::Rejected(format!("status {}", response.status)),
                Err(e) => Outcome::Failed(e),
            },
        };
        let success = matches!(outcome, Outcome::Ok);
        self.finish("set_pause_duration", outcome, started);
        success
    }
}
