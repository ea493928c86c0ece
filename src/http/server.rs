//! Gateway HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router and wire the security middleware
//! - Assemble the default validator set from configuration
//! - Bind plaintext or TLS listeners
//! - Graceful shutdown on ctrl-c / SIGTERM

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::TrustConfig;
use crate::http::middleware::{request_id_middleware, security_validation_middleware};
use crate::net::limit::ConnectionLimitAcceptor;
use crate::trust::conn_limit::ConnectionRateLimiter;
use crate::pipeline::validators::authentication::AuthenticationValidator;
use crate::pipeline::validators::authorization::AuthorizationValidator;
use crate::pipeline::validators::input_inspection::InputInspectionValidator;
use crate::pipeline::validators::rate_limit::{RateLimitValidator, RateLimiterState};
use crate::pipeline::SecurityValidationPipeline;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state injected into middleware and handlers. Both the config
/// and the pipeline are hot-swappable so a reload never interrupts
/// in-flight requests. The rate-limiter state is constructed once per
/// process and injected into every pipeline rebuild, so a reload never
/// forgets who was seen when.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<ArcSwap<TrustConfig>>,
    pub pipeline: Arc<ArcSwap<SecurityValidationPipeline>>,
    pub rate_limiter: RateLimiterState,
}

/// Assemble the default validator set for a configuration.
pub fn build_request_pipeline(
    config: &TrustConfig,
    rate_state: RateLimiterState,
) -> SecurityValidationPipeline {
    let rv = &config.request_validation;
    let mut pipeline = SecurityValidationPipeline::new(rv.block_severity);
    pipeline.register(Arc::new(AuthenticationValidator::new()));
    pipeline.register(Arc::new(AuthorizationValidator::new(
        rv.admin_path_prefix.clone(),
        rv.admin_role.clone(),
    )));
    pipeline.register(Arc::new(RateLimitValidator::new(
        rate_state,
        Duration::from_millis(rv.min_request_interval_ms),
    )));
    pipeline.register(Arc::new(InputInspectionValidator::new()));
    pipeline
}

/// Gateway HTTP server.
pub struct GatewayServer {
    router: Router,
    state: GatewayState,
}

impl GatewayServer {
    /// Create a server with the default validator set.
    pub fn new(config: TrustConfig) -> Self {
        let rate_limiter = RateLimiterState::new();
        let state = GatewayState {
            pipeline: Arc::new(ArcSwap::from_pointee(build_request_pipeline(
                &config,
                rate_limiter.clone(),
            ))),
            config: Arc::new(ArcSwap::from_pointee(config)),
            rate_limiter,
        };
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router. The health endpoint is registered after
    /// the security layer so probes are never validated.
    fn build_router(state: GatewayState) -> Router {
        Router::new()
            .route("/", any(validated_handler))
            .route("/{*path}", any(validated_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                security_validation_middleware,
            ))
            .route("/healthz", get(healthz))
            .with_state(state)
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Swap in a reloaded configuration and a pipeline rebuilt from it.
    /// The rebuilt rate limiter shares the existing last-seen state.
    pub fn apply_config(state: &GatewayState, config: TrustConfig) {
        state.pipeline.store(Arc::new(build_request_pipeline(
            &config,
            state.rate_limiter.clone(),
        )));
        state.config.store(Arc::new(config));
        tracing::info!("Configuration reloaded");
    }

    /// Serve plaintext HTTP on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Serve TLS on `addr` with the assembled rustls configuration.
    ///
    /// Every accepted connection is counted against the per-endpoint
    /// limit for its lifetime; over-limit endpoints are refused before
    /// the handshake starts.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        limiter: Arc<ConnectionRateLimiter>,
        connection_limit: i64,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "Gateway listening (TLS)");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        let acceptor =
            ConnectionLimitAcceptor::new(RustlsAcceptor::new(tls), limiter, connection_limit);
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind(addr)
            .acceptor(acceptor)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Placeholder upstream handler: every request reaching this point has
/// passed the full validation pipeline.
async fn validated_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "validated" })))
}

async fn healthz(State(state): State<GatewayState>) -> impl IntoResponse {
    let validators = state.pipeline.load().validator_names();
    Json(json!({ "status": "ok", "validators": validators }))
}

/// Resolves when the process receives ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
