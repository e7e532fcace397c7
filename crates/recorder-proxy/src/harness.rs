//! In-memory stand-in for the vendor platform.
//!
//! [`InMemoryVendor`] implements [`VendorApi`] over a small backing store of
//! recorders, sessions and pauses, counts the calls it receives, and can be told
//! to fail logins or every other call. The unit and integration tests drive the
//! adapter and the HTTP routes through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::error::VendorError;
use crate::model::{AuthIdentity, LoginResponse, RemoteRecorder, RestResponse, ScheduleRequest, Session};
use crate::vendor::VendorApi;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fault(message: &str) -> VendorError {
    VendorError::Fault {
        code: "s:Client".into(),
        message: message.into(),
    }
}

fn rest(status: u16, body: impl Into<String>) -> RestResponse {
    RestResponse {
        status,
        body: body.into(),
    }
}

#[derive(Default)]
struct Store {
    recorders: HashMap<Uuid, RemoteRecorder>,
    sessions: HashMap<Uuid, Session>,
    deliveries: HashMap<Uuid, Uuid>,
    pauses: HashMap<Uuid, (Uuid, Option<i64>)>,
    injected_cookies: Vec<String>,
}

pub struct InMemoryVendor {
    store: Mutex<Store>,
    login_calls: AtomicUsize,
    vendor_calls: AtomicUsize,
    fail_logins: AtomicBool,
    fail_calls: AtomicBool,
    login_delay: Mutex<Duration>,
    login_cookie: Mutex<Option<String>>,
    pause_body: Mutex<Option<String>>,
}

impl Default for InMemoryVendor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVendor {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            login_calls: AtomicUsize::new(0),
            vendor_calls: AtomicUsize::new(0),
            fail_logins: AtomicBool::new(false),
            fail_calls: AtomicBool::new(false),
            login_delay: Mutex::new(Duration::ZERO),
            login_cookie: Mutex::new(Some(".ASPXAUTH=test-session; path=/".into())),
            pause_body: Mutex::new(None),
        }
    }

    pub fn add_recorder(&self, id: Uuid, name: &str, state: &str) {
        lock(&self.store).recorders.insert(
            id,
            RemoteRecorder {
                id,
                name: name.to_string(),
                state: state.to_string(),
                scheduled_recordings: Vec::new(),
            },
        );
    }

    /// Adds a session and lists it on `recorder_id`'s schedule, if that recorder exists.
    pub fn add_session(&self, recorder_id: Option<Uuid>, session: Session) {
        let mut store = lock(&self.store);
        if let Some(recorder) = recorder_id.and_then(|id| store.recorders.get_mut(&id)) {
            recorder.scheduled_recordings.push(session.id);
        }
        store.sessions.insert(session.id, session);
    }

    /// Maps a public delivery id onto an internal session id.
    pub fn add_delivery(&self, delivery_id: Uuid, session_id: Uuid) {
        lock(&self.store).deliveries.insert(delivery_id, session_id);
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        lock(&self.store).sessions.get(&id).cloned()
    }

    pub fn pause_duration(&self, pause_id: Uuid) -> Option<i64> {
        lock(&self.store).pauses.get(&pause_id).and_then(|(_, d)| *d)
    }

    pub fn injected_cookies(&self) -> Vec<String> {
        lock(&self.store).injected_cookies.clone()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    /// Calls other than the login.
    pub fn vendor_calls(&self) -> usize {
        self.vendor_calls.load(Ordering::SeqCst)
    }

    pub fn fail_logins(&self, fail: bool) {
        self.fail_logins.store(fail, Ordering::SeqCst);
    }

    pub fn fail_calls(&self, fail: bool) {
        self.fail_calls.store(fail, Ordering::SeqCst);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *lock(&self.login_delay) = delay;
    }

    pub fn set_login_cookie(&self, cookie: Option<String>) {
        *lock(&self.login_cookie) = cookie;
    }

    /// Overrides the body returned by the pause endpoint.
    pub fn set_pause_body(&self, body: Option<String>) {
        *lock(&self.pause_body) = body;
    }

    fn enter(&self) -> Result<(), VendorError> {
        self.vendor_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(fault("service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl VendorApi for InMemoryVendor {
    async fn log_on_with_password(&self, _user_key: &str, _password: &str) -> Result<LoginResponse, VendorError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.login_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_logins.load(Ordering::SeqCst) {
            return Err(fault("invalid credentials"));
        }
        Ok(LoginResponse {
            accepted: true,
            set_cookies: lock(&self.login_cookie).iter().cloned().collect(),
        })
    }

    fn inject_session_cookie(&self, set_cookie: &str) {
        lock(&self.store).injected_cookies.push(set_cookie.to_string());
    }

    async fn get_remote_recorders_by_id(
        &self,
        _auth: &AuthIdentity,
        ids: &[Uuid],
    ) -> Result<Vec<RemoteRecorder>, VendorError> {
        self.enter()?;
        let store = lock(&self.store);
        Ok(ids.iter().filter_map(|id| store.recorders.get(id).cloned()).collect())
    }

    async fn get_sessions_by_id(&self, _auth: &AuthIdentity, ids: &[Uuid]) -> Result<Vec<Session>, VendorError> {
        self.enter()?;
        let store = lock(&self.store);
        Ok(ids.iter().filter_map(|id| store.sessions.get(id).cloned()).collect())
    }

    async fn update_recording_time(
        &self,
        _auth: &AuthIdentity,
        session_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), VendorError> {
        self.enter()?;
        let mut store = lock(&self.store);
        let session = store
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| fault("session not found"))?;
        session.start_time = Some(start);
        session.duration = Some((end - start).num_milliseconds() as f64 / 1000.0);
        Ok(())
    }

    async fn schedule_recording(&self, _auth: &AuthIdentity, request: &ScheduleRequest) -> Result<Vec<Uuid>, VendorError> {
        self.enter()?;
        let mut store = lock(&self.store);
        let recorder = store
            .recorders
            .get_mut(&request.recorder_id)
            .ok_or_else(|| fault("remote recorder not found"))?;

        let id = Uuid::new_v4();
        recorder.scheduled_recordings.push(id);
        store.sessions.insert(
            id,
            Session {
                id,
                name: request.name.clone(),
                start_time: Some(request.start),
                duration: Some((request.end - request.start).num_milliseconds() as f64 / 1000.0),
                folder_id: Some(request.folder_id),
                state: Some("Scheduled".into()),
            },
        );
        Ok(vec![id])
    }

    async fn get_delivery_metadata(&self, delivery_id: Uuid) -> Result<RestResponse, VendorError> {
        self.enter()?;
        let store = lock(&self.store);
        Ok(match store.deliveries.get(&delivery_id) {
            Some(session_id) => rest(
                200,
                serde_json::json!({ "SessionPublicID": session_id, "DeliveryId": delivery_id }).to_string(),
            ),
            None => rest(404, "{\"Message\":\"Not found\"}"),
        })
    }

    async fn pause_session(&self, session_id: Uuid) -> Result<RestResponse, VendorError> {
        self.enter()?;
        let mut store = lock(&self.store);
        if !store.sessions.contains_key(&session_id) {
            return Ok(rest(404, ""));
        }
        if let Some(body) = lock(&self.pause_body).clone() {
            return Ok(rest(200, body));
        }
        let pause_id = Uuid::new_v4();
        store.pauses.insert(pause_id, (session_id, None));
        Ok(rest(200, format!("\"{}\"", pause_id)))
    }

    async fn set_pause_duration(
        &self,
        session_id: Uuid,
        pause_id: Uuid,
        duration_secs: i64,
    ) -> Result<RestResponse, VendorError> {
        self.enter()?;
        let mut store = lock(&self.store);
        match store.pauses.get_mut(&pause_id) {
            Some((owner, duration)) if *owner == session_id => {
                *duration = Some(duration_secs);
                Ok(rest(200, ""))
            }
            _ => Ok(rest(404, "")),
        }
    }
}
