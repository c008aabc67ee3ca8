use anyhow::{Context, Result};
use clap::Parser;
use ibcwatch_chain::TendermintSessionBuilder;
use ibcwatch_collector::{DirectorySource, GitHubSource, PathSource, Refresher, RetryPolicy};
use ibcwatch_telemetry::{MetricsRegistry, MetricsServer, MetricsServerConfig};
use ibcwatch_types::ExporterConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timeout for requests to the path registry
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "ibcwatch",
    about = "Prometheus exporter for IBC path health and relayer wallet balances",
    version,
    author
)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.toml",
        help = "Configuration file path"
    )]
    config: PathBuf,

    #[arg(short, long, value_name = "PORT", help = "Metrics server port, overrides server.listen_address")]
    port: Option<u16>,

    #[arg(long, value_name = "SECS", help = "Collector refresh interval in seconds")]
    refresh: Option<u64>,

    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log filter (trace, debug, info, warn, error or a RUST_LOG directive)"
    )]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref())?;

    let config = load_config(&cli)?;
    run(config).await
}

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    match log_level {
        Some(level) => ibcwatch_log::init_tracing_with_level(level),
        None => ibcwatch_log::init_tracing(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

fn load_config(cli: &Cli) -> Result<ExporterConfig> {
    let mut config = ExporterConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if let Some(port) = cli.port {
        let mut address = config.server.socket_addr()?;
        address.set_port(port);
        config.server.listen_address = address.to_string();
    }
    if let Some(refresh) = cli.refresh {
        config.refresh.interval_secs = refresh;
    }

    config.validate()?;
    Ok(config)
}

fn path_source(config: &ExporterConfig) -> Result<Option<Arc<dyn PathSource>>> {
    if let Some(dir) = &config.paths_dir {
        return Ok(Some(Arc::new(DirectorySource::new(dir))));
    }

    match &config.github {
        Some(github) => {
            let source = GitHubSource::new(
                github.clone(),
                config.github_token.clone(),
                REGISTRY_TIMEOUT,
            )?;
            Ok(Some(Arc::new(source)))
        }
        None => {
            tracing::warn!("No path source configured, exporting wallet balances only");
            Ok(None)
        }
    }
}

async fn run(config: ExporterConfig) -> Result<()> {
    tracing::info!(
        rpcs = config.rpc.len(),
        accounts = config.accounts.len(),
        "Starting ibcwatch {}",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown = CancellationToken::new();
    let registry = Arc::new(MetricsRegistry::new(config.server.scrape_timeout())?);

    let refresher = Arc::new(Refresher::new(
        path_source(&config)?,
        config.rpc_map(),
        config.accounts.clone(),
        Arc::new(TendermintSessionBuilder::new()),
        RetryPolicy::from(&config.retry),
        registry.clone(),
        config.refresh.interval(),
    ));
    let refresh_task = tokio::spawn(refresher.run(shutdown.clone()));

    let server = MetricsServer::new(
        MetricsServerConfig {
            bind_address: config.server.socket_addr()?,
            metrics_path: config.server.metrics_path.clone(),
            enable_health_check: true,
        },
        registry,
        shutdown.clone(),
    );
    let mut server_task = server.spawn();

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
            server_task.await??;
        }
        served = &mut server_task => {
            // The server only returns early on a bind or accept failure
            shutdown.cancel();
            served??;
        }
    }

    refresh_task.await?;
    tracing::info!("ibcwatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
