mod batch;
mod commands;
mod config;
mod error;
mod history;
mod models;
mod olt;
mod parser;
mod session;
mod transport;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batch::BatchService;
use config::Config;
use history::HistoryService;
use olt::OltService;
use session::SessionManager;

/// Service graph shared with the API layer
#[allow(dead_code)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub olt: Arc<OltService>,
    pub batches: Arc<BatchService>,
    pub history: Arc<HistoryService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "olt_manager=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Starting OLT Manager");
    tracing::info!("Device: {}:{} ({})", cfg.olt_host, cfg.olt_port, cfg.transport);
    if cfg.simulation_mode {
        tracing::info!("Simulation mode: no hardware will be touched");
    }

    // Build the service graph: one channel, one session, injected services
    let channel = transport::build(&cfg);
    let session = Arc::new(SessionManager::new(
        channel,
        Duration::from_secs(cfg.command_timeout_secs),
    ));
    let history = Arc::new(HistoryService::new());
    let olt = Arc::new(OltService::new(session.clone(), history.clone()));
    let batches = Arc::new(BatchService::new(olt.clone()));

    let state = AppState {
        session: session.clone(),
        olt: olt.clone(),
        batches,
        history,
    };

    // Connect and enter config mode; in simulation mode this always succeeds
    match state.olt.initialize().await {
        Ok(()) => match state.olt.get_system_info().await {
            Ok(info) => {
                tracing::info!(
                    "Connected to {} ({}) up {}",
                    info.model,
                    info.version,
                    info.uptime
                );
            }
            Err(e) => tracing::warn!("Could not read system info: {}", e),
        },
        Err(e) => {
            tracing::warn!("Initial connection failed, will retry on first command: {}", e);
        }
    }

    shutdown_signal().await;

    tracing::info!("OLT Manager shutting down");
    session.disconnect().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
