//! Vendor login handshake and the identity cached after it.
//!
//! The handshake runs at most once at a time. Callers that arrive while it is in
//! flight wait on the handshake lock and then observe the settled state. A
//! successful login is kept for the life of the process; a failed one leaves the
//! session unauthenticated so the next caller tries again.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::metrics::ProxyMetrics;
use crate::model::AuthIdentity;
use crate::vendor::VendorApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated(AuthIdentity),
}

pub struct VendorSession {
    api: Arc<dyn VendorApi>,
    credentials: AuthIdentity,
    state: RwLock<SessionState>,
    handshake: Mutex<()>,
    metrics: Arc<ProxyMetrics>,
}

impl VendorSession {
    pub fn new(api: Arc<dyn VendorApi>, user_key: String, password: String, metrics: Arc<ProxyMetrics>) -> Self {
        Self {
            api,
            credentials: AuthIdentity { user_key, password },
            state: RwLock::new(SessionState::Unauthenticated),
            handshake: Mutex::new(()),
            metrics,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Identity to stamp on vendor calls, once logged in.
    pub async fn identity(&self) -> Option<AuthIdentity> {
        match &*self.state.read().await {
            SessionState::Authenticated(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        self.identity().await.is_some()
    }

    /// Logs in unless already logged in. Never fails loudly: every handshake
    /// problem is logged and reported as `false`.
    pub async fn ensure_logged_in(&self) -> bool {
        if self.is_logged_in().await {
            return true;
        }

        let _guard = self.handshake.lock().await;

        // Another caller may have finished the handshake while we waited.
        if self.is_logged_in().await {
            return true;
        }

        *self.state.write().await = SessionState::Authenticating;
        let identity = self.handshake().await;
        let logged_in = identity.is_some();

        *self.state.write().await = match identity {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::Unauthenticated,
        };

        logged_in
    }

    async fn handshake(&self) -> Option<AuthIdentity> {
        self.metrics.handshakes.inc();
        let user_key = &self.credentials.user_key;

        let response = match self
            .api
            .log_on_with_password(user_key, &self.credentials.password)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(user = %user_key, error = %e, "vendor login failed");
                self.metrics.handshake_failures.inc();
                return None;
            }
        };

        if !response.accepted {
            warn!(user = %user_key, "vendor rejected login");
            self.metrics.handshake_failures.inc();
            return None;
        }

        if response.set_cookies.is_empty() {
            // Calls still carry the credentials, so a missing cookie is not fatal.
            warn!(user = %user_key, "vendor login returned no Set-Cookie header");
        }
        for cookie in &response.set_cookies {
            self.api.inject_session_cookie(cookie);
        }

        info!(user = %user_key, cookies = response.set_cookies.len(), "vendor session established");
        Some(self.credentials.clone())
    }
}
