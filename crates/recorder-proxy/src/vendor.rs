//! Transport to the vendor platform.
//!
//! [`VendorApi`] is the seam between the adapter and the wire: one method per
//! remote call, each returning the raw outcome. [`HttpVendorClient`] speaks SOAP
//! to the three management services and JSON to the REST API over a single
//! reqwest client that shares one cookie jar.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, SET_COOKIE};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::VendorError;
use crate::model::{AuthIdentity, LoginResponse, RemoteRecorder, RestResponse, ScheduleRequest, Session};
use crate::soap::{self, XmlNode};

const AUTH_SERVICE: &str = "PublicAPI/4.2/Auth.svc";
const SESSION_SERVICE: &str = "PublicAPI/4.6/SessionManagement.svc";
const RECORDER_SERVICE: &str = "PublicAPI/4.2/RemoteRecorderManagement.svc";
const REST_API: &str = "api/v1";

#[async_trait]
pub trait VendorApi: Send + Sync {
    /// Password login; exposes the `Set-Cookie` headers of the transport response.
    async fn log_on_with_password(&self, user_key: &str, password: &str) -> Result<LoginResponse, VendorError>;

    /// Stores a harvested cookie for every later call to the vendor.
    fn inject_session_cookie(&self, set_cookie: &str);

    async fn get_remote_recorders_by_id(
        &self,
        auth: &AuthIdentity,
        ids: &[Uuid],
    ) -> Result<Vec<RemoteRecorder>, VendorError>;

    async fn get_sessions_by_id(&self, auth: &AuthIdentity, ids: &[Uuid]) -> Result<Vec<Session>, VendorError>;

    async fn update_recording_time(
        &self,
        auth: &AuthIdentity,
        session_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), VendorError>;

    /// Returns the ids of the sessions the vendor created.
    async fn schedule_recording(&self, auth: &AuthIdentity, request: &ScheduleRequest) -> Result<Vec<Uuid>, VendorError>;

    async fn get_delivery_metadata(&self, delivery_id: Uuid) -> Result<RestResponse, VendorError>;

    async fn pause_session(&self, session_id: Uuid) -> Result<RestResponse, VendorError>;

    async fn set_pause_duration(
        &self,
        session_id: Uuid,
        pause_id: Uuid,
        duration_secs: i64,
    ) -> Result<RestResponse, VendorError>;
}

struct SoapReply {
    body: XmlNode,
    set_cookies: Vec<String>,
}

pub struct HttpVendorClient {
    client: reqwest::Client,
    cookies: Arc<Jar>,
    base_url: Url,
    auth_endpoint: Url,
    session_endpoint: Url,
    recorder_endpoint: Url,
    rest_base: String,
}

fn join(base: &Url, prefix: &str, path: &str) -> Result<Url, VendorError> {
    let prefix = prefix.trim_matches('/');
    let full = if prefix.is_empty() {
        format!("/{}", path)
    } else {
        format!("/{}/{}", prefix, path)
    };
    base.join(&full)
        .map_err(|e| VendorError::Transport(format!("bad vendor URL: {}", e)))
}

impl HttpVendorClient {
    pub fn new(config: &ServerConfig) -> Result<Self, VendorError> {
        let base_url = Url::parse(&config.vendor_base_url())
            .map_err(|e| VendorError::Transport(format!("bad vendor URL: {}", e)))?;
        let prefix = config.vendor_path_prefix.as_str();

        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .connect_timeout(config.vendor_timeout())
            .read_timeout(config.vendor_timeout())
            .user_agent(format!("recorder-proxy/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let rest_base = join(&base_url, prefix, REST_API)?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            cookies,
            auth_endpoint: join(&base_url, prefix, AUTH_SERVICE)?,
            session_endpoint: join(&base_url, prefix, SESSION_SERVICE)?,
            recorder_endpoint: join(&base_url, prefix, RECORDER_SERVICE)?,
            rest_base,
            base_url,
        })
    }

    async fn call(
        &self,
        endpoint: &Url,
        contract: &str,
        operation: &str,
        envelope: String,
    ) -> Result<SoapReply, VendorError> {
        debug!("SOAP {} -> {}", operation, endpoint);

        let response = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", soap::soap_action(contract, operation))
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let text = response.text().await?;

        // A fault wins over the HTTP status; services answer faults with 500.
        match soap::response_body(&text) {
            Err(fault @ VendorError::Fault { .. }) => Err(fault),
            _ if !status.is_success() => Err(VendorError::Status {
                status: status.as_u16(),
            }),
            Ok(body) => Ok(SoapReply { body, set_cookies }),
            Err(e) => Err(e),
        }
    }

    async fn rest(&self, request: reqwest::RequestBuilder) -> Result<RestResponse, VendorError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RestResponse { status, body })
    }
}

#[async_trait]
impl VendorApi for HttpVendorClient {
    async fn log_on_with_password(&self, user_key: &str, password: &str) -> Result<LoginResponse, VendorError> {
        let envelope = soap::log_on_with_password(user_key, password)?;
        let reply = self
            .call(&self.auth_endpoint, "IAuth", "LogOnWithPassword", envelope)
            .await?;
        Ok(LoginResponse {
            accepted: soap::parse_login_result(&reply.body)?,
            set_cookies: reply.set_cookies,
        })
    }

    fn inject_session_cookie(&self, set_cookie: &str) {
        self.cookies.add_cookie_str(set_cookie, &self.base_url);
    }

    async fn get_remote_recorders_by_id(
        &self,
        auth: &AuthIdentity,
        ids: &[Uuid],
    ) -> Result<Vec<RemoteRecorder>, VendorError> {
        let envelope = soap::get_remote_recorders_by_id(auth, ids)?;
        let reply = self
            .call(&self.recorder_endpoint, "IRemoteRecorderManagement", "GetRemoteRecordersById", envelope)
            .await?;
        soap::parse_remote_recorders(&reply.body)
    }

    async fn get_sessions_by_id(&self, auth: &AuthIdentity, ids: &[Uuid]) -> Result<Vec<Session>, VendorError> {
        let envelope = soap::get_sessions_by_id(auth, ids)?;
        let reply = self
            .call(&self.session_endpoint, "ISessionManagement", "GetSessionsById", envelope)
            .await?;
        soap::parse_sessions(&reply.body)
    }

    async fn update_recording_time(
        &self,
        auth: &AuthIdentity,
        session_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), VendorError> {
        let envelope = soap::update_recording_time(auth, session_id, start, end)?;
        let reply = self
            .call(&self.recorder_endpoint, "IRemoteRecorderManagement", "UpdateRecordingTime", envelope)
            .await?;
        if soap::parse_update_conflicts(&reply.body) {
            warn!("Vendor reported conflicts updating session {}", session_id);
        }
        Ok(())
    }

    async fn schedule_recording(&self, auth: &AuthIdentity, request: &ScheduleRequest) -> Result<Vec<Uuid>, VendorError> {
        let envelope = soap::schedule_recording(auth, request)?;
        let reply = self
            .call(&self.recorder_endpoint, "IRemoteRecorderManagement", "ScheduleRecording", envelope)
            .await?;
        soap::parse_schedule_result(&reply.body)
    }

    async fn get_delivery_metadata(&self, delivery_id: Uuid) -> Result<RestResponse, VendorError> {
        let url = format!("{}/sessions/delivery/{}", self.rest_base, delivery_id);
        self.rest(self.client.get(url)).await
    }

    async fn pause_session(&self, session_id: Uuid) -> Result<RestResponse, VendorError> {
        let url = format!("{}/remoteRecorders/sessions/{}/pause", self.rest_base, session_id);
        self.rest(self.client.post(url).header(reqwest::header::CONTENT_LENGTH, 0))
            .await
    }

    async fn set_pause_duration(
        &self,
        session_id: Uuid,
        pause_id: Uuid,
        duration_secs: i64,
    ) -> Result<RestResponse, VendorError> {
        let url = format!(
            "{}/remoteRecorders/sessions/{}/pauses/{}",
            self.rest_base, session_id, pause_id
        );
        let body = serde_json::json!({ "durationSeconds": duration_secs });
        self.rest(self.client.post(url).json(&body)).await
    }
}
