//! # Lexfront — site lifecycle server
//!
//! Runs the publication/campaign lifecycle engine for the firm's site:
//! the admin REST gateway plus the background sweep loop that publishes
//! scheduled posts and sends scheduled newsletters.
//!
//! Usage:
//!   lexfront                         # Serve with defaults (port 8090)
//!   lexfront --port 8080             # Custom port
//!   lexfront --sweep-interval 10     # Faster sweep ticks
//!   lexfront --no-sweep              # Gateway only (e.g. behind a worker)

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lexfront_core::SiteConfig;
use lexfront_dispatch::{DbSubscriberRegistry, SearchPing, SmtpDispatcher, StubDispatcher};
use lexfront_gateway::AppState;
use lexfront_lifecycle::notify::CampaignDispatcher;
use lexfront_lifecycle::{Lifecycle, SiteDb, Sweeper};

#[derive(Parser)]
#[command(name = "lexfront", version, about = "⚖️ Lexfront — law-firm site lifecycle server")]
struct Cli {
    /// Gateway port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Seconds between sweep ticks (overrides config)
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Disable the background sweep loop
    #[arg(long)]
    no_sweep: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "lexfront=debug,tower_http=debug"
    } else {
        "lexfront=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Load config and apply CLI overrides
    let mut config = match &cli.config {
        Some(path) => SiteConfig::load_from(std::path::Path::new(&expand_path(path)))?,
        None => SiteConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(secs) = cli.sweep_interval {
        config.sweep.interval_secs = secs;
    }
    if cli.no_sweep {
        config.sweep.enabled = false;
    }

    // Open database
    let db_path = expand_path(&config.db_path);
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(SiteDb::open(std::path::Path::new(&db_path))?);
    tracing::info!("💾 Database: {db_path}");

    // Wire collaborators
    let registry = Arc::new(DbSubscriberRegistry::new(db.clone()));
    let dispatcher: Arc<dyn CampaignDispatcher> = if config.smtp.enabled {
        tracing::info!("📧 SMTP dispatch via {}", config.smtp.host);
        Arc::new(SmtpDispatcher::new(&config.smtp)?)
    } else {
        tracing::info!("📧 SMTP disabled — using stub dispatcher");
        Arc::new(StubDispatcher::default())
    };
    let search = Arc::new(SearchPing::new(&config.search));

    let service = Arc::new(Lifecycle::new(
        db,
        registry,
        dispatcher,
        search,
        &config.base_url,
        config.dispatch.clone(),
    ));

    // Background sweep loop
    let sweeper = if config.sweep.enabled {
        let sweeper = Sweeper::new(
            service.clone(),
            std::time::Duration::from_secs(config.sweep.interval_secs.max(1)),
        );
        Some(sweeper.start())
    } else {
        tracing::warn!("⏰ Sweep loop disabled — scheduled items will not fire");
        None
    };

    // Serve the gateway until ctrl-c, then stop the sweeper cleanly
    let state = AppState { service };
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    tokio::select! {
        result = lexfront_gateway::serve(state, &host, port) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("👋 Shutting down");
        }
    }

    if let Some(handle) = sweeper {
        handle.stop().await;
    }
    Ok(())
}
