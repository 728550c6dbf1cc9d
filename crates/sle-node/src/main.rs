//! sle-node — the Seat Lock Engine service binary.
//!
//! Startup sequence:
//!   1. Load configuration from the environment
//!   2. Wire the Lock Ledger, Shadow Store, and Event Bus adapters (Redis +
//!      Postgres in production; in-memory doubles for local development)
//!   3. Build the Hold Coordinator, Availability Projector, and Admin
//!      service on top of those ports
//!   4. Spawn the Expiry Reaper as a background task
//!   5. Serve the HTTP API until shutdown

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sle_api::AppState;
use sle_bus::{EventBus, InProcessEventBus};
use sle_coordinator::{FixedWindowRateLimiter, HoldCoordinator, RateLimiter};
use sle_core::Config;
use sle_ledger::{LockLedger, MemoryLockLedger, RedisLockLedger};
use sle_projector::AvailabilityQuery;
use sle_reaper::{AdminService, ExpiryReaper, ReaperConfig};
use sle_shadow::{MemoryShadowStore, PostgresShadowStore, ShadowStore};

/// CLI overrides for the environment-sourced `Config` (spec §6.1). Flags
/// take precedence over the corresponding environment variable.
#[derive(Parser, Debug)]
#[command(
    name = "sle-node",
    version,
    about = "Seat Lock Engine — fenced, atomic multi-seat reservation service"
)]
struct Args {
    /// HTTP listen address, overrides HTTP_LISTEN_ADDR.
    #[arg(long)]
    http_listen_addr: Option<std::net::SocketAddr>,

    /// Run with in-memory ledger/shadow adapters instead of Redis/Postgres.
    /// Intended for local development and integration tests.
    #[arg(long, env = "SLE_LOCAL_DEV")]
    local_dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sle=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(addr) = args.http_listen_addr {
        config.http_listen_addr = addr;
    }
    info!(local_dev = args.local_dev, "seat lock engine starting");

    let (ledger, shadow): (Arc<dyn LockLedger>, Arc<dyn ShadowStore>) = if args.local_dev {
        warn!("running with in-memory ledger and shadow store — not for production use");
        (
            Arc::new(MemoryLockLedger::new()),
            Arc::new(MemoryShadowStore::new()),
        )
    } else {
        let ledger = RedisLockLedger::new(
            &config.redis_url,
            config.ledger_command_timeout_ms,
            3,
        )
        .context("constructing Redis lock ledger")?;
        let shadow = PostgresShadowStore::connect(&config.database_url)
            .await
            .context("connecting Postgres shadow store")?;
        (Arc::new(ledger), Arc::new(shadow))
    };

    let bus: Arc<dyn EventBus> = Arc::new(InProcessEventBus::new());
    let rate_limiter: Arc<dyn RateLimiter> = Arc::new(FixedWindowRateLimiter::new(
        config.rate_limit_burst,
        config.rate_limit_window_secs,
    ));

    let coordinator = Arc::new(HoldCoordinator::new(
        Arc::clone(&ledger),
        Arc::clone(&shadow),
        Arc::clone(&bus),
        rate_limiter,
        config.clone(),
    ));
    let query = Arc::new(AvailabilityQuery::new(
        Arc::clone(&ledger),
        Arc::clone(&shadow),
    ));
    let admin = Arc::new(AdminService::new(Arc::clone(&shadow), Arc::clone(&bus)));

    let state = AppState {
        coordinator,
        query,
        admin,
        bus: Arc::clone(&bus),
        ledger: Arc::clone(&ledger),
        shadow: Arc::clone(&shadow),
    };

    let shutdown = CancellationToken::new();

    let reaper = ExpiryReaper::new(ledger, shadow, bus, ReaperConfig::default());
    let reaper_shutdown = shutdown.clone();
    let reaper_task = tokio::spawn(async move { reaper.run(reaper_shutdown).await });

    let listener = tokio::net::TcpListener::bind(config.http_listen_addr)
        .await
        .with_context(|| format!("binding {}", config.http_listen_addr))?;
    info!(addr = %config.http_listen_addr, "http server listening");

    let app = sle_api::router(state);
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("serving http")?;

    shutdown.cancel();
    let _ = reaper_task.await;
    info!("seat lock engine stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
