use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::adapter::RecorderAdapter;
use crate::api::{self, AppState};
use crate::auth::{basic_auth_middleware, CredentialGate};
use crate::config::ServerConfig;
use crate::metrics::ProxyMetrics;
use crate::vendor::{HttpVendorClient, VendorApi};

/// Builds the full route table behind the credential gate.
pub fn create_router(state: AppState) -> Router {
    let gate = CredentialGate::new(
        state.config.gate_username.clone(),
        state.config.gate_password.clone(),
        state.config.realm.clone(),
        Arc::clone(&state.metrics),
    );
    let metrics = Arc::clone(&state.metrics);

    Router::new()
        .route("/recorder/state", get(api::get_recorder_state))
        .route("/recorder/sessions", get(api::get_recorder_sessions))
        .route("/sessions", get(api::get_all_sessions))
        .route("/recorders", get(api::get_recorders))
        .route("/session/update-time", post(api::post_update_time))
        .route("/session/start", post(api::post_start))
        .route("/session/pause", post(api::post_pause))
        .route("/session/resume", post(api::post_resume))
        .route("/session/stop", post(api::post_stop))
        .route("/session/create", post(api::post_create))
        .route("/health", get(api::get_health))
        .route("/metrics", get(api::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn_with_state(gate, basic_auth_middleware))
        .layer(middleware::from_fn_with_state(metrics, api::track_latency))
        .layer(TraceLayer::new_for_http())
}

pub struct ProxyServer {
    config: Arc<ServerConfig>,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let vendor: Arc<dyn VendorApi> = Arc::new(HttpVendorClient::new(&config)?);
        Self::with_vendor(config, vendor)
    }

    /// Same as [`ProxyServer::new`] over any vendor transport.
    pub fn with_vendor(config: ServerConfig, vendor: Arc<dyn VendorApi>) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let metrics = Arc::new(ProxyMetrics::new()?);
        let adapter = Arc::new(RecorderAdapter::new(
            vendor,
            config.vendor_username.clone(),
            config.vendor_password.clone(),
            Arc::clone(&metrics),
        ));
        let state = AppState {
            adapter,
            metrics,
            config: Arc::clone(&config),
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            state,
            shutdown_tx,
        })
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!(
            "recorder-proxy listening on {} (vendor {})",
            self.config.bind_addr,
            self.config.vendor_base_url()
        );

        let shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal(shutdown_rx))
            .await?;

        info!("recorder-proxy stopped");
        Ok(())
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
