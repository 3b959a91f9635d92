//! RADOLAN point fetcher service.
//!
//! Tracks the value of DWD RADOLAN radar composites at one location:
//! - Conditional downloads (ETag / If-None-Match)
//! - Shared projected grid, refreshed once a day
//! - One update cycle per product and interval
//! - HTTP status API and Prometheus metrics

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use projection::GridProjector;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use radar_fetcher::{
    run_server, CompositeSource, FetcherConfig, HttpCompositeSource, Location, ProductTracker,
    Scheduler, ServerState,
};

#[derive(Parser, Debug)]
#[command(name = "radar-fetcher")]
#[command(about = "Track DWD RADOLAN radar values at a fixed location")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "RADOLAN_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the RADOLAN open data directory
    #[arg(long, env = "RADOLAN_BASE_URL")]
    base_url: Option<String>,

    /// Target latitude (overrides the config file)
    #[arg(long, allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Target longitude (overrides the config file)
    #[arg(long, allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8090")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    // Initialize Prometheus metrics exporter
    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Starting RADOLAN fetcher");

    let config = load_config(&args)?;

    let source: Arc<dyn CompositeSource> = Arc::new(HttpCompositeSource::new(&config.base_url)?);
    let grids = Arc::new(GridProjector::new());

    let trackers: Vec<Arc<ProductTracker>> = config
        .radar_products()?
        .into_iter()
        .map(|product| Arc::new(ProductTracker::new(product, source.clone(), grids.clone())))
        .collect();

    for tracker in &trackers {
        let product = tracker.product();
        info!(
            product = %product.code,
            name = %product.name,
            latitude = product.location.latitude,
            longitude = product.location.longitude,
            "Tracking product"
        );
    }

    let scheduler = Scheduler::new(trackers.clone(), config.interval(), config.cycle_timeout());

    if args.once {
        info!("Running single update cycle");

        let reports = scheduler.run_once().await;
        if reports.iter().all(|report| !report.is_success()) {
            bail!("All {} product updates failed", reports.len());
        }
        return Ok(());
    }

    // Start status server (unless disabled)
    if !args.no_status_server {
        let server_state = Arc::new(ServerState::new(trackers, Some(prometheus_handle)));
        let status_port = args.status_port;
        tokio::spawn(async move {
            if let Err(e) = run_server(server_state, status_port).await {
                tracing::error!(error = %e, "Status server failed");
            }
        });
    }

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    // Handle Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(()).ok();
    });

    scheduler.run_forever(shutdown_rx).await?;

    info!("RADOLAN fetcher stopped");
    Ok(())
}

/// Build the configuration from the optional file and command line overrides.
fn load_config(args: &Args) -> Result<FetcherConfig> {
    let mut config = match &args.config {
        Some(path) => FetcherConfig::load(path)?,
        None => FetcherConfig::default(),
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }

    match (args.latitude, args.longitude) {
        (Some(latitude), Some(longitude)) => {
            if config.location.is_some() {
                warn!("Command line location overrides configuration file");
            }
            config.location = Some(Location::new(latitude, longitude));
        }
        (None, None) => {}
        _ => bail!("--latitude and --longitude must be given together"),
    }

    config.validate()?;
    Ok(config)
}
