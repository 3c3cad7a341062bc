//! Eqiva Service - HTTP bridge and status poller.
//!
//! Run with: `cargo run -p eqiva-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use eqiva_core::{
    Aliases, BleConnector, ConnectionConfig, Controller, ScanOptions, SessionConfig,
    ThermostatOptions,
};
use eqiva_service::{AppState, BluetoothConfig, Collector, Config, StatusStore, api};

/// Extra time for service discovery and subscribing after the link is up.
const SUBSCRIBE_SLACK: Duration = Duration::from_secs(10);

/// Eqiva Service - HTTP bridge and status poller for radiator thermostats.
#[derive(Parser, Debug)]
#[command(name = "eqiva-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Status store path (overrides config).
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Disable background polling (API only mode).
    #[arg(long)]
    no_poller: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("eqiva_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(path) = args.store {
        config.storage.path = path;
    }
    if args.no_poller {
        config.poller.enabled = false;
    }
    config.validate()?;

    info!("Opening status store at {:?}", config.storage.path);
    let store = StatusStore::open(&config.storage.path);
    let state = AppState::new(build_controller(&config.bluetooth), store);

    if config.poller.enabled {
        Collector::new(Arc::clone(&state), config.poller.interval()).start();
    } else {
        info!("Background poller disabled");
    }

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_controller(bluetooth: &BluetoothConfig) -> Controller<BleConnector> {
    let mut connection = ConnectionConfig::default();
    let mut session = SessionConfig::default();
    let mut scan = ScanOptions::new();

    if let Some(secs) = bluetooth.timeout {
        let link = Duration::from_secs(secs);
        connection = connection.connection_timeout(link);
        session = session.connect_timeout(link + SUBSCRIBE_SLACK);
        scan = scan.duration(link);
    }
    if let Some(secs) = bluetooth.response_timeout {
        session = session.response_timeout(Duration::from_secs_f64(secs));
    }

    Controller::new(
        BleConnector::new(connection, scan),
        Aliases::new(),
        ThermostatOptions::default().session(session),
    )
}
