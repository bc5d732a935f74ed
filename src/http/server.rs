//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for hooks, public and admin routes
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Serve until the shutdown signal fires

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use bitcoin::Network;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::AdminConfig;
use crate::error::SettlementResult;
use crate::http::request::X_REQUEST_ID;
use crate::http::{handlers, hooks};
use crate::ledger::LedgerStore;
use crate::registry::Registry;
use crate::scheduler::{Scheduler, Submission};
use crate::settlement::DrawSchedule;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub registry: Registry,
    pub ledger: LedgerStore,
    pub schedule: DrawSchedule,
    pub pot_address: String,
    pub network: Network,
    pub admin_api_key: Arc<str>,
}

impl AppState {
    /// Queue `job(scheduler)` in the background under `key`. Submissions
    /// for a key that already has a rerun queued are dropped.
    pub fn spawn_job<T, F, Fut>(&self, key: impl Into<String>, job: &'static str, work: F) -> Submission
    where
        T: Send + 'static,
        F: Fn(Arc<Scheduler>) -> Fut + Send + 'static,
        Fut: Future<Output = SettlementResult<T>> + Send + 'static,
    {
        let scheduler = Arc::clone(&self.scheduler);
        self.scheduler
            .jobs()
            .submit(key, job, move || work(Arc::clone(&scheduler)))
    }
}

/// HTTP server for hooks, registrations and admin routes.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &AdminConfig) -> Self {
        Self {
            router: build_router(state, config),
        }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, config: &AdminConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/draws/{id}", get(handlers::get_draw))
        .route("/registrations", post(handlers::register))
        .route("/registrations/{id}", get(handlers::get_registration))
        .route("/registrations/{id}/guarantee", get(handlers::get_guarantee))
        .route("/registrations/{id}/process", post(handlers::process_registration))
        .route("/forwarding", post(handlers::create_forwarding))
        .route("/hooks/lottery-payment", post(hooks::lottery_payment))
        .route("/hooks/block", post(hooks::block))
        .route("/hooks/sponsor-tx", post(hooks::sponsor_tx))
        .route("/hooks/forwarding-tx", post(hooks::forwarding_tx))
        .merge(admin::router(state.clone()))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID)))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid))
}
