//! Zero-Trust Validation Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────┐
//!                    │              TRUSTGATE                     │
//!                    │                                            │
//!   TLS handshake    │  ┌─────────┐    ┌──────────────────────┐  │
//!   ─────────────────┼─▶│   net   │───▶│  trust pipeline      │  │
//!                    │  │verifier │    │  pin → ocsp → ct →   │  │
//!                    │  └─────────┘    │  connection limit    │  │
//!                    │                 └──────────────────────┘  │
//!                    │                                            │
//!   HTTP request     │  ┌─────────┐    ┌──────────────────────┐  │
//!   ─────────────────┼─▶│  http   │───▶│  request pipeline    │  │
//!                    │  │ server  │    │  authn → authz →     │  │
//!                    │  └─────────┘    │  rate → inspection   │  │
//!                    │                 └──────────────────────┘  │
//!                    │                                            │
//!                    │  ┌──────────────────────────────────────┐ │
//!                    │  │  config · observability · lifecycle  │ │
//!                    │  └──────────────────────────────────────┘ │
//!                    └────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trustgate::config::{load_config, TrustConfig};
use trustgate::config::watcher::ConfigWatcher;
use trustgate::http::server::GatewayServer;
use trustgate::net::build_listener_config;
use trustgate::observability::metrics;
use trustgate::trust::CertificateTrustPipeline;

#[derive(Parser, Debug)]
#[command(name = "trustgate", version, about = "Zero-trust validation gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trustgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => TrustConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        pinning = config.pinning.enabled,
        ocsp = config.revocation.use_ocsp,
        transparency = config.transparency.verify,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let trust = Arc::new(CertificateTrustPipeline::new(config.clone())?);
    let _sweeper = trust.connection_limiter().spawn_sweeper();

    let server = GatewayServer::new(config.clone());

    // Hot reload: validated updates swap the request pipeline in place.
    // Trust settings take effect at the next restart because the TLS
    // verifiers hold their pipeline for the listener's lifetime.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path).spawn()?;
            let state = server.state().clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    GatewayServer::apply_config(&state, new_config);
                }
            });
            Some(watcher)
        }
        None => None,
    };

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let rustls_config =
                build_listener_config(tls, trust.clone(), tokio::runtime::Handle::current())?;
            server
                .run_tls(
                    addr,
                    rustls_config,
                    trust.connection_limiter().clone(),
                    trust.endpoint_connection_limit(),
                )
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
