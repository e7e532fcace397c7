//! End-to-end tests for the HTTP surface.
//!
//! Each test builds the real router over an `InMemoryVendor` and drives it
//! with `oneshot` requests, so the credential gate, the handlers, the adapter
//! and the session manager all run as in production.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use recorder_proxy::{
    config::RecorderEntry, harness::InMemoryVendor, model::Session, timing::parse_timestamp, ProxyServer,
    ServerConfig, VendorApi,
};

const GATE: &str = "operator:correct horse";

struct Fixture {
    app: Router,
    vendor: Arc<InMemoryVendor>,
    recorder: Uuid,
}

fn config(recorder: Uuid, folder: Option<Uuid>) -> ServerConfig {
    ServerConfig {
        vendor_host: "video.example.edu".into(),
        vendor_username: "svc".into(),
        vendor_password: "pw".into(),
        gate_username: "operator".into(),
        gate_password: "correct horse".into(),
        realm: "Lecture Capture".into(),
        default_folder_id: folder,
        recorders: vec![RecorderEntry {
            id: recorder,
            name: "Room 12".into(),
        }],
        ..Default::default()
    }
}

fn fixture_with_folder(folder: Option<Uuid>) -> Fixture {
    let vendor = Arc::new(InMemoryVendor::new());
    let recorder = Uuid::new_v4();
    vendor.add_recorder(recorder, "Room 12", "Previewing");

    let server = ProxyServer::with_vendor(
        config(recorder, folder),
        Arc::clone(&vendor) as Arc<dyn VendorApi>,
    )
    .unwrap();

    Fixture {
        app: server.router(),
        vendor,
        recorder,
    }
}

fn fixture() -> Fixture {
    fixture_with_folder(Some(Uuid::new_v4()))
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now_secs() -> DateTime<Utc> {
    Utc::now().duration_trunc(Duration::seconds(1)).unwrap()
}

fn session_at(start: Option<DateTime<Utc>>, duration: Option<f64>) -> Session {
    Session {
        id: Uuid::new_v4(),
        name: "Lecture".into(),
        start_time: start,
        duration,
        folder_id: None,
        state: None,
    }
}

async fn send(app: &Router, method: &str, uri: &str, credentials: Option<&str>) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(credentials) = credentials {
        builder = builder.header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode(credentials)),
        );
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, challenge, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, "GET", uri, Some(GATE)).await;
    (status, body)
}

async fn post(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, "POST", uri, Some(GATE)).await;
    (status, body)
}

fn time_field(body: &Value, field: &str) -> DateTime<Utc> {
    parse_timestamp(body[field].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn gate_rejects_every_route_without_exact_credentials() {
    let f = fixture();
    let routes = [
        ("GET", "/recorder/state"),
        ("GET", "/recorder/sessions"),
        ("GET", "/sessions"),
        ("GET", "/recorders"),
        ("POST", "/session/update-time"),
        ("POST", "/session/start"),
        ("POST", "/session/pause"),
        ("POST", "/session/resume"),
        ("POST", "/session/stop"),
        ("POST", "/session/create"),
        ("GET", "/health"),
        ("GET", "/metrics"),
    ];

    for (method, uri) in routes {
        for credentials in [None, Some("operator:wrong"), Some("intruder:correct horse"), Some("operator")] {
            let (status, challenge, _) = send(&f.app, method, uri, credentials).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {} with {:?}", method, uri, credentials);
            assert_eq!(challenge.as_deref(), Some("Basic realm=\"Lecture Capture\""));
        }
    }

    // Nothing reached the vendor, not even the login.
    assert_eq!(f.vendor.login_calls(), 0);

    let (status, _, body) = send(&f.app, "GET", "/recorders", Some(GATE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Room 12");
    assert_eq!(body[0]["id"], f.recorder.to_string());
}

#[tokio::test]
async fn recorder_state_is_reported() {
    let f = fixture();
    let (status, body) = get(&f.app, &format!("/recorder/state?remoteRecorderId={}", f.recorder)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Previewing");
    assert_eq!(body["remoteRecorderId"], f.recorder.to_string());

    let (status, body) = get(&f.app, &format!("/recorder/state?remoteRecorderId={}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Unknown");

    let (status, body) = get(&f.app, "/recorder/state?remoteRecorderId=room-12").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn session_listings_keep_only_today() {
    let f = fixture();
    let now = now_secs();
    let today = session_at(Some(now), Some(3000.0));
    let later = session_at(Some(now + Duration::days(2)), Some(3000.0));
    f.vendor.add_session(Some(f.recorder), today.clone());
    f.vendor.add_session(Some(f.recorder), later);

    let (status, body) = get(&f.app, &format!("/recorder/sessions?remoteRecorderId={}", f.recorder)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionCount"], 1);
    assert_eq!(body["sessions"][0]["id"], today.id.to_string());

    let (status, body) = get(&f.app, "/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSessionCount"], 1);
    assert_eq!(body["recorders"][0]["name"], "Room 12");
    assert_eq!(body["recorders"][0]["sessionCount"], 1);
}

#[tokio::test]
async fn empty_recorder_lists_no_sessions() {
    let f = fixture();
    let (status, body) = get(&f.app, &format!("/recorder/sessions?remoteRecorderId={}", f.recorder)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionCount"], 0);
    assert_eq!(body["sessions"], Value::Array(vec![]));
}

#[tokio::test]
async fn update_time_validates_and_applies() {
    let f = fixture();
    let s = session_at(Some(now_secs()), Some(3600.0));
    f.vendor.add_session(Some(f.recorder), s.clone());

    let start = now_secs() + Duration::minutes(30);
    let end = start + Duration::minutes(50);

    let (status, body) = post(
        &f.app,
        &format!("/session/update-time?sessionId={}&newStartTime={}&newEndTime={}", s.id, ts(end), ts(start)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = post(
        &f.app,
        &format!("/session/update-time?sessionId={}&newStartTime={}&newEndTime={}", s.id, ts(start), ts(end)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let stored = f.vendor.session(s.id).unwrap();
    assert_eq!(stored.start_time, Some(start));
    assert_eq!(stored.end_time(), Some(end));

    let (status, _) = post(
        &f.app,
        &format!("/session/update-time?sessionId={}&newStartTime={}&newEndTime={}", Uuid::new_v4(), ts(start), ts(end)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_moves_start_to_now_and_keeps_scheduled_end() {
    let f = fixture();
    let original = now_secs() + Duration::minutes(10);
    let s = session_at(Some(original), Some(1800.0));
    f.vendor.add_session(Some(f.recorder), s.clone());

    let before = Utc::now();
    let (status, body) = post(&f.app, &format!("/session/start?sessionId={}", s.id)).await;
    let after = Utc::now();

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(time_field(&body, "originalStartTime"), original);
    assert_eq!(time_field(&body, "newEndTime"), original + Duration::seconds(1800));
    assert_eq!(time_field(&body, "endTime"), original + Duration::seconds(1800));

    let new_start = time_field(&body, "newStartTime");
    assert!(new_start >= before && new_start <= after);

    let stored = f.vendor.session(s.id).unwrap();
    assert_eq!(stored.start_time, Some(new_start));
    let drift = stored.end_time().unwrap() - (original + Duration::seconds(1800));
    assert!(drift.num_milliseconds().abs() <= 1, "end drifted by {}", drift);
}

#[tokio::test]
async fn start_defaults_missing_duration() {
    let f = fixture();
    let original = now_secs() + Duration::minutes(5);
    let s = session_at(Some(original), None);
    f.vendor.add_session(Some(f.recorder), s.clone());

    let (status, body) = post(&f.app, &format!("/session/start?sessionId={}", s.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(time_field(&body, "newEndTime"), original + Duration::seconds(3600));
}

#[tokio::test]
async fn start_and_stop_unknown_session_is_not_found() {
    let f = fixture();
    let missing = Uuid::new_v4();

    let (status, body) = post(&f.app, &format!("/session/start?sessionId={}", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = post(&f.app, &format!("/session/stop?sessionId={}", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stop_ends_recording_now() {
    let f = fixture();
    let original = now_secs() - Duration::minutes(20);
    let running = session_at(Some(original), Some(3600.0));
    let unscheduled = session_at(None, Some(3600.0));
    f.vendor.add_session(Some(f.recorder), running.clone());
    f.vendor.add_session(Some(f.recorder), unscheduled.clone());

    let (status, body) = post(&f.app, &format!("/session/stop?sessionId={}", running.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(time_field(&body, "originalStartTime"), original);
    let end = time_field(&body, "newEndTime");
    assert!(end <= Utc::now() && end > original);
    assert_eq!(f.vendor.session(running.id).unwrap().start_time, Some(original));

    let (status, _) = post(&f.app, &format!("/session/stop?sessionId={}", unscheduled.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pause_then_resume_reports_elapsed_seconds() {
    let f = fixture();
    let s = session_at(Some(now_secs()), Some(3600.0));
    let delivery = Uuid::new_v4();
    f.vendor.add_session(Some(f.recorder), s.clone());
    f.vendor.add_delivery(delivery, s.id);

    let (status, body) = post(&f.app, &format!("/session/pause?sessionId={}", delivery)).await;
    assert_eq!(status, StatusCode::OK);
    let pause_id: Uuid = body["pauseId"].as_str().unwrap().parse().unwrap();

    let paused_at = Utc::now() - Duration::seconds(10);
    let (status, body) = post(
        &f.app,
        &format!(
            "/session/resume?sessionId={}&pauseId={}&pauseStartTime={}",
            delivery,
            pause_id,
            paused_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let secs = body["durationSeconds"].as_i64().unwrap();
    assert!((10..=11).contains(&secs), "duration {}", secs);
    assert_eq!(f.vendor.pause_duration(pause_id), Some(secs));
}

#[tokio::test]
async fn resume_with_future_pause_start_uses_floor() {
    let f = fixture();
    let s = session_at(Some(now_secs()), Some(3600.0));
    let delivery = Uuid::new_v4();
    f.vendor.add_session(Some(f.recorder), s.clone());
    f.vendor.add_delivery(delivery, s.id);

    let (_, body) = post(&f.app, &format!("/session/pause?sessionId={}", delivery)).await;
    let pause_id = body["pauseId"].as_str().unwrap().to_string();

    let future = now_secs() + Duration::minutes(5);
    let (status, body) = post(
        &f.app,
        &format!("/session/resume?sessionId={}&pauseId={}&pauseStartTime={}", delivery, pause_id, ts(future)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["durationSeconds"], 1);
}

#[tokio::test]
async fn pause_unknown_delivery_is_not_found() {
    let f = fixture();
    let (status, body) = post(&f.app, &format!("/session/pause?sessionId={}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn create_schedules_into_default_folder() {
    let folder = Uuid::new_v4();
    let f = fixture_with_folder(Some(folder));
    let start = now_secs() + Duration::hours(2);

    let (status, body) = post(
        &f.app,
        &format!(
            "/session/create?remoteRecorderId={}&sessionName=Linear%20Algebra&startTime={}&duration=3000",
            f.recorder,
            ts(start)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["folderId"], folder.to_string());
    assert_eq!(body["sessionName"], "Linear Algebra");

    let created: Uuid = body["sessionId"].as_str().unwrap().parse().unwrap();
    let stored = f.vendor.session(created).unwrap();
    assert_eq!(stored.start_time, Some(start));
    assert_eq!(stored.end_time(), Some(start + Duration::seconds(3000)));
    assert_eq!(stored.folder_id, Some(folder));
}

#[tokio::test]
async fn create_requires_folder_and_valid_duration() {
    let f = fixture_with_folder(None);
    let start = ts(now_secs() + Duration::hours(2));

    let (status, _) = post(
        &f.app,
        &format!("/session/create?remoteRecorderId={}&sessionName=X&startTime={}&duration=3000", f.recorder, start),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let f = fixture();
    let (status, _) = post(
        &f.app,
        &format!("/session/create?remoteRecorderId={}&sessionName=X&startTime={}&duration=-5", f.recorder, start),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &f.app,
        &format!("/session/create?remoteRecorderId={}&sessionName=X&startTime={}&duration=60", Uuid::new_v4(), start),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["sessionId"], Value::Null);
}

#[tokio::test]
async fn create_rejects_durations_past_the_calendar() {
    let f = fixture();
    let start = ts(now_secs() + Duration::hours(2));

    for duration in ["1000000000000000", "9223372036854775807"] {
        let (status, body) = post(
            &f.app,
            &format!(
                "/session/create?remoteRecorderId={}&sessionName=X&startTime={}&duration={}",
                f.recorder, start, duration
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "duration {}", duration);
        assert_eq!(body["success"], false);
    }
    assert_eq!(f.vendor.vendor_calls(), 0);
}

#[tokio::test]
async fn start_with_runaway_vendor_duration_is_rejected() {
    let f = fixture();
    let original = now_secs() + Duration::minutes(10);
    let s = session_at(Some(original), Some(1e13));
    f.vendor.add_session(Some(f.recorder), s.clone());

    let (status, body) = post(&f.app, &format!("/session/start?sessionId={}", s.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(f.vendor.session(s.id).unwrap().start_time, Some(original));
}

#[tokio::test]
async fn vendor_login_failure_degrades_every_route() {
    let f = fixture();
    f.vendor.fail_logins(true);
    let s = session_at(Some(now_secs()), Some(3600.0));
    f.vendor.add_session(Some(f.recorder), s.clone());

    let (status, body) = get(&f.app, &format!("/recorder/state?remoteRecorderId={}", f.recorder)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Error");

    let (status, body) = get(&f.app, &format!("/recorder/sessions?remoteRecorderId={}", f.recorder)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionCount"], 0);

    let (status, _) = post(&f.app, &format!("/session/start?sessionId={}", s.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get(&f.app, "/health").await;
    assert_eq!(body["loggedIn"], false);

    assert_eq!(f.vendor.vendor_calls(), 0);
}

#[tokio::test]
async fn concurrent_first_requests_log_in_once() {
    let f = fixture();
    f.vendor.set_login_delay(std::time::Duration::from_millis(50));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = f.app.clone();
        let uri = format!("/recorder/state?remoteRecorderId={}", f.recorder);
        handles.push(tokio::spawn(async move { get(&app, &uri).await }));
    }
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "Previewing");
    }
    assert_eq!(f.vendor.login_calls(), 1);
}

#[tokio::test]
async fn metrics_count_outcomes() {
    let f = fixture();
    get(&f.app, &format!("/recorder/state?remoteRecorderId={}", f.recorder)).await;
    send(&f.app, "GET", "/recorders", None).await;

    let response = f
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, format!("Basic {}", STANDARD.encode(GATE)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("recorder_proxy_adapter_operations_total{operation=\"recorder_state\",outcome=\"ok\"} 1"));
    assert!(text.contains("recorder_proxy_gate_rejections_total 1"));
    assert!(text.contains("recorder_proxy_vendor_handshakes_total 1"));
}
