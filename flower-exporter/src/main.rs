//! Prometheus exporter for Celery Flower.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use flower_exporter::{
    Coordinator, ExporterConfig, HttpServer, MetricRegistry, StatusBoard, Variant,
};
use flower_exporter_common::init_tracing;

/// Prometheus exporter for Celery Flower.
#[derive(Parser, Debug)]
#[command(name = "flower-exporter")]
#[command(about = "Export Celery Flower queue and worker statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Flower base URL to poll; repeat for several targets (overrides config).
    #[arg(
        long = "flower",
        num_args = 1..,
        env = "FLOWER_HOSTS_LIST",
        value_delimiter = ' '
    )]
    flower: Vec<String>,

    /// HTTP listen address (overrides config).
    #[arg(long, env = "DEFAULT_ADDR")]
    addr: Option<String>,

    /// Payload variant to poll (overrides config).
    #[arg(long, value_enum)]
    variant: Option<Variant>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Load the configuration file, if any, and apply command line overrides.
    fn into_config(self) -> anyhow::Result<ExporterConfig> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ExporterConfig::default(),
        };

        let targets: Vec<String> = self
            .flower
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !targets.is_empty() {
            config.flower.targets = targets;
        }

        if let Some(addr) = self.addr {
            config.prometheus.listen = addr;
        }

        if let Some(variant) = self.variant {
            config.flower.variant = variant;
        }

        if self.verbose {
            config.logging.level = "debug".to_string();
        } else if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        targets = ?config.flower.normalized_targets(),
        variant = %config.flower.variant,
        "Starting Flower Prometheus exporter"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = Arc::new(MetricRegistry::new());
    let status = Arc::new(StatusBoard::new());

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        registry.clone(),
        status.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );
    // Bind before starting pollers.
    let listener = http_server.bind().await?;

    let coordinator = Coordinator::start(
        &config.flower,
        registry.clone(),
        status.clone(),
        shutdown_rx.clone(),
    )
    .context("Failed to build the Flower HTTP client")?;

    // Start HTTP server
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve(listener, http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let exit_when_all_stopped = config.flower.exit_when_all_stopped;
    let mut pollers = tokio::spawn(coordinator.join());
    let mut pollers_done = false;

    // Wait for a shutdown signal, or for every poller to stop when configured to.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate_signal() => {
            info!("Received SIGTERM, shutting down...");
        }
        result = &mut pollers, if exit_when_all_stopped => {
            pollers_done = true;
            match result {
                Ok(stopped) => warn!(targets = stopped.len(), "All Flower targets stopped, exiting"),
                Err(e) => error!("Coordinator task failed: {}", e),
            }
        }
    }

    // Signal shutdown
    if shutdown_tx.send(true).is_err() {
        warn!("No task listening for shutdown");
    }

    // Wait for tasks to complete
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        if !pollers_done {
            let _ = (&mut pollers).await;
        }
        let _ = http_task.await;
    })
    .await;
    if drained.is_err() {
        warn!("Timed out waiting for tasks to stop");
    }

    let stats = registry.stats();
    info!(
        updates_applied = stats.updates_applied,
        samples_written = stats.samples_written,
        series_count = registry.series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

/// Resolves on SIGTERM; never resolves where that signal does not exist.
async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
