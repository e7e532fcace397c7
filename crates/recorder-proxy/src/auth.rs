use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::debug;

use crate::metrics::ProxyMetrics;

/// Shared username/password pair checked on every inbound request.
#[derive(Clone)]
pub struct CredentialGate {
    username: String,
    password: String,
    realm: String,
    metrics: Arc<ProxyMetrics>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("unsupported authorization scheme")]
    UnsupportedScheme,
    #[error("malformed credentials")]
    Malformed,
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Decodes a `Basic` authorization value into `(username, password)`.
/// The password is everything after the first colon.
pub fn parse_basic(header: Option<&HeaderValue>) -> Result<(String, String), GateError> {
    let header = header.ok_or(GateError::MissingHeader)?;
    let value = header.to_str().map_err(|_| GateError::Malformed)?;

    let (scheme, encoded) = value.trim().split_once(' ').ok_or(GateError::UnsupportedScheme)?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return Err(GateError::UnsupportedScheme);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| GateError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| GateError::Malformed)?;
    let (user, pass) = decoded.split_once(':').ok_or(GateError::Malformed)?;

    Ok((user.to_string(), pass.to_string()))
}

impl CredentialGate {
    pub fn new(username: String, password: String, realm: String, metrics: Arc<ProxyMetrics>) -> Self {
        Self {
            username,
            password,
            realm,
            metrics,
        }
    }

    pub fn check(&self, header: Option<&HeaderValue>) -> Result<(), GateError> {
        let (user, pass) = parse_basic(header)?;
        if user == self.username && pass == self.password {
            Ok(())
        } else {
            Err(GateError::InvalidCredentials)
        }
    }

    pub fn challenge(&self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        let challenge = format!("Basic realm=\"{}\"", self.realm.replace('"', "'"));
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

pub async fn basic_auth_middleware(State(gate): State<CredentialGate>, req: Request, next: Next) -> Response {
    match gate.check(req.headers().get(header::AUTHORIZATION)) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            debug!("Rejected {} {}: {}", req.method(), req.uri().path(), e);
            gate.metrics.gate_rejections.inc();
            gate.challenge()
        }
    }
}
