use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// One scheduled or in-progress recording on the vendor side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    /// Length in seconds, when the vendor reports one
    pub duration: Option<f64>,
    pub folder_id: Option<Uuid>,
    pub state: Option<String>,
}

impl Session {
    /// `None` without a start or duration, or when the sum overflows.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        crate::timing::offset_by_secs(self.start_time?, self.duration?)
    }
}

/// A capture device as reported by the recorder management service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecorder {
    pub id: Uuid,
    pub name: String,
    /// Opaque state string (`Recording`, `Previewing`, `Faulted`, ...)
    pub state: String,
    pub scheduled_recordings: Vec<Uuid>,
}

/// Credentials stamped on every SOAP call after the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub user_key: String,
    pub password: String,
}

impl fmt::Debug for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthIdentity")
            .field("user_key", &self.user_key)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of the password login call.
#[derive(Debug, Clone, Default)]
pub struct LoginResponse {
    pub accepted: bool,
    /// Raw `Set-Cookie` header values, in response order
    pub set_cookies: Vec<String>,
}

/// Non-recurring recording on a single recorder.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub recorder_id: Uuid,
    pub name: String,
    pub folder_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_broadcast: bool,
}

/// Raw answer from one of the vendor's JSON endpoints.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
