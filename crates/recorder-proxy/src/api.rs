use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Instant};
use uuid::Uuid;

use crate::{
    adapter::RecorderAdapter,
    config::ServerConfig,
    metrics::ProxyMetrics,
    model::Session,
    timing::{self, parse_timestamp},
};

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<RecorderAdapter>,
    pub metrics: Arc<ProxyMetrics>,
    pub config: Arc<ServerConfig>,
}

type Params = Query<HashMap<String, String>>;

/// Adds `success` and `message` to a JSON object body.
fn reply(status: StatusCode, mut body: Value, message: &str) -> Response {
    if let Value::Object(map) = &mut body {
        map.insert("success".into(), Value::Bool(status.is_success()));
        map.insert("message".into(), Value::String(message.to_string()));
    }
    (status, Json(body)).into_response()
}

fn bad_request(message: &str) -> Response {
    reply(StatusCode::BAD_REQUEST, json!({}), message)
}

fn text_param<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, Response> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request(&format!("{} is required", name)))
}

fn uuid_param(params: &HashMap<String, String>, name: &str) -> Result<Uuid, Response> {
    let raw = text_param(params, name)?;
    Uuid::parse_str(raw).map_err(|_| bad_request(&format!("{} must be a GUID", name)))
}

fn time_param(params: &HashMap<String, String>, name: &str) -> Result<DateTime<Utc>, Response> {
    let raw = text_param(params, name)?;
    parse_timestamp(raw).ok_or_else(|| bad_request(&format!("{} must be an ISO 8601 timestamp", name)))
}

fn todays(config: &ServerConfig, sessions: Vec<Session>) -> Vec<Session> {
    if config.filter_today {
        timing::sessions_for_day(sessions, Utc::now())
    } else {
        sessions
    }
}

macro_rules! try_param {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(response) => return response,
        }
    };
}

pub async fn track_latency(State(metrics): State<Arc<ProxyMetrics>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(req).await;
    metrics.request_latency.observe(start.elapsed().as_secs_f64());
    response
}

// GET /recorder/state?remoteRecorderId=
pub async fn get_recorder_state(State(state): State<AppState>, Query(params): Params) -> Response {
    let recorder_id = try_param!(uuid_param(&params, "remoteRecorderId"));
    let recorder_state = state.adapter.recorder_state(recorder_id).await;
    Json(json!({
        "remoteRecorderId": recorder_id,
        "state": recorder_state,
    }))
    .into_response()
}

// GET /recorder/sessions?remoteRecorderId=
pub async fn get_recorder_sessions(State(state): State<AppState>, Query(params): Params) -> Response {
    let recorder_id = try_param!(uuid_param(&params, "remoteRecorderId"));
    let sessions = todays(&state.config, state.adapter.recorder_sessions(recorder_id).await);
    Json(json!({
        "remoteRecorderId": recorder_id,
        "sessionCount": sessions.len(),
        "sessions": sessions,
    }))
    .into_response()
}

// GET /sessions
pub async fn get_all_sessions(State(state): State<AppState>) -> Response {
    let mut total = 0;
    let mut recorders = Vec::with_capacity(state.config.recorders.len());

    for recorder in &state.config.recorders {
        let sessions = todays(&state.config, state.adapter.recorder_sessions(recorder.id).await);
        total += sessions.len();
        recorders.push(json!({
            "id": recorder.id,
            "name": recorder.name,
            "sessionCount": sessions.len(),
            "sessions": sessions,
        }));
    }

    Json(json!({
        "totalSessionCount": total,
        "recorders": recorders,
    }))
    .into_response()
}

// GET /recorders
pub async fn get_recorders(State(state): State<AppState>) -> Response {
    let recorders: Vec<Value> = state
        .config
        .recorders
        .iter()
        .map(|r| json!({ "name": r.name, "id": r.id }))
        .collect();
    Json(recorders).into_response()
}

// POST /session/update-time?sessionId=&newStartTime=&newEndTime=
pub async fn post_update_time(State(state): State<AppState>, Query(params): Params) -> Response {
    let session_id = try_param!(uuid_param(&params, "sessionId"));
    let start = try_param!(time_param(&params, "newStartTime"));
    let end = try_param!(time_param(&params, "newEndTime"));

    let body = json!({
        "sessionId": session_id,
        "newStartTime": start,
        "newEndTime": end,
    });

    if end <= start {
        return reply(StatusCode::BAD_REQUEST, body, "newEndTime must be after newStartTime");
    }

    if state.adapter.update_session_time(session_id, start, end).await {
        reply(StatusCode::OK, body, "Session time updated")
    } else {
        reply(StatusCode::BAD_REQUEST, body, "Failed to update session time")
    }
}

// POST /session/start?sessionId=
pub async fn post_start(State(state): State<AppState>, Query(params): Params) -> Response {
    let session_id = try_param!(uuid_param(&params, "sessionId"));

    let Some(session) = state.adapter.session(session_id).await else {
        return reply(StatusCode::NOT_FOUND, json!({ "sessionId": session_id }), "Session not found");
    };

    let window = timing::start_window(
        &session,
        Utc::now(),
        state.config.start_baseline,
        state.config.default_duration_secs,
    );
    let Some((start, end)) = window else {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "sessionId": session_id, "originalStartTime": session.start_time }),
            "Session duration is out of range",
        );
    };
    let body = json!({
        "sessionId": session_id,
        "originalStartTime": session.start_time,
        "newStartTime": start,
        "newEndTime": end,
        "endTime": end,
    });

    if state.adapter.update_session_time(session_id, start, end).await {
        reply(StatusCode::OK, body, "Session started")
    } else {
        reply(StatusCode::BAD_REQUEST, body, "Failed to start session")
    }
}

// POST /session/stop?sessionId=
pub async fn post_stop(State(state): State<AppState>, Query(params): Params) -> Response {
    let session_id = try_param!(uuid_param(&params, "sessionId"));

    let window = state
        .adapter
        .session(session_id)
        .await
        .and_then(|session| timing::stop_window(&session, Utc::now()));
    let Some((start, end)) = window else {
        return reply(StatusCode::NOT_FOUND, json!({ "sessionId": session_id }), "Session not found");
    };

    let body = json!({
        "sessionId": session_id,
        "originalStartTime": start,
        "newEndTime": end,
    });

    if state.adapter.update_session_time(session_id, start, end).await {
        reply(StatusCode::OK, body, "Session stopped")
    } else {
        reply(StatusCode::BAD_REQUEST, body, "Failed to stop session")
    }
}

// POST /session/pause?sessionId=
pub async fn post_pause(State(state): State<AppState>, Query(params): Params) -> Response {
    let delivery_id = try_param!(uuid_param(&params, "sessionId"));

    let Some(internal_id) = state.adapter.session_public_id(delivery_id).await else {
        return reply(StatusCode::NOT_FOUND, json!({ "sessionId": delivery_id }), "Session not found");
    };

    match state.adapter.pause_session(internal_id).await {
        Some(pause_id) => reply(
            StatusCode::OK,
            json!({ "sessionId": delivery_id, "pauseId": pause_id }),
            "Session paused",
        ),
        None => reply(
            StatusCode::BAD_REQUEST,
            json!({ "sessionId": delivery_id, "pauseId": Value::Null }),
            "Failed to pause session",
        ),
    }
}

// POST /session/resume?sessionId=&pauseId=&pauseStartTime=
pub async fn post_resume(State(state): State<AppState>, Query(params): Params) -> Response {
    let delivery_id = try_param!(uuid_param(&params, "sessionId"));
    let pause_id = try_param!(uuid_param(&params, "pauseId"));
    let pause_started = try_param!(time_param(&params, "pauseStartTime"));

    let Some(internal_id) = state.adapter.session_public_id(delivery_id).await else {
        return reply(StatusCode::NOT_FOUND, json!({ "sessionId": delivery_id }), "Session not found");
    };

    let resume_time = Utc::now();
    let duration_secs = timing::pause_duration_secs(pause_started, resume_time);
    let body = json!({
        "sessionId": delivery_id,
        "pauseId": pause_id,
        "durationSeconds": duration_secs,
        "resumeTime": resume_time,
    });

    if state.adapter.set_pause_duration(internal_id, pause_id, duration_secs).await {
        reply(StatusCode::OK, body, "Session resumed")
    } else {
        reply(StatusCode::BAD_REQUEST, body, "Failed to resume session")
    }
}

// POST /session/create?remoteRecorderId=&sessionName=&startTime=&duration=
pub async fn post_create(State(state): State<AppState>, Query(params): Params) -> Response {
    let recorder_id = try_param!(uuid_param(&params, "remoteRecorderId"));
    let name = try_param!(text_param(&params, "sessionName")).to_string();
    let start = try_param!(time_param(&params, "startTime"));
    let duration_secs: i64 = match try_param!(text_param(&params, "duration")).parse() {
        Ok(secs) if secs > 0 => secs,
        _ => return bad_request("duration must be a positive number of seconds"),
    };

    let Some((duration, end)) = Duration::try_seconds(duration_secs)
        .and_then(|duration| start.checked_add_signed(duration).map(|end| (duration, end)))
    else {
        return bad_request("duration is out of range");
    };

    let Some(folder_id) = state.config.default_folder_id else {
        return bad_request("No default folder is configured");
    };

    let created = state
        .adapter
        .create_recording(recorder_id, &name, start, duration, folder_id)
        .await;

    let body = json!({
        "sessionId": created,
        "remoteRecorderId": recorder_id,
        "sessionName": name,
        "startTime": start,
        "endTime": end,
        "duration": duration_secs,
        "folderId": folder_id,
    });

    match created {
        Some(_) => reply(StatusCode::OK, body, "Recording scheduled"),
        None => reply(StatusCode::BAD_REQUEST, body, "Failed to schedule recording"),
    }
}

// GET /health
pub async fn get_health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "loggedIn": state.adapter.vendor_session().is_logged_in().await,
    }))
    .into_response()
}

// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let prometheus = state.metrics.export_prometheus();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus,
    )
        .into_response()
}
