//! `people-server`: runs the people API with its repository worker pool.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use peoplebus_server::repository::MemoryPersonRepository;
use peoplebus_server::{
    BusConfig, Dispatcher, NetworkConfig, NetworkModule, PersonRepository, WorkerPool,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP port.
    #[arg(long, env = "PEOPLE_API_BIND_PORT", default_value_t = 8080)]
    port: u16,

    /// HTTP bind address.
    #[arg(long, env = "PEOPLE_API_BIND_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Number of repository workers.
    #[arg(long, env = "PEOPLE_REPOSITORY_WORKERS", default_value_t = 1)]
    workers: usize,

    /// redb database file. People are kept in memory when omitted.
    #[arg(long, env = "PEOPLE_DATABASE")]
    database: Option<PathBuf>,

    /// How long a request waits for its worker's reply.
    #[arg(long, default_value_t = 30_000)]
    dispatch_timeout_ms: u64,

    /// Upper bound on a whole HTTP exchange.
    #[arg(long, default_value_t = 60_000)]
    request_timeout_ms: u64,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "PEOPLE_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Some(port) = cli.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "metrics listener started");
    }

    let repository = open_repository(cli.database.as_deref())?;

    let bus = BusConfig {
        worker_count: cli.workers.max(1),
        dispatch_timeout: Duration::from_millis(cli.dispatch_timeout_ms),
        ..BusConfig::default()
    };
    if cli.workers == 0 {
        warn!("worker count 0 is not usable; starting one worker");
    }

    let dispatcher = Arc::new(Dispatcher::new());
    let pool = WorkerPool::spawn(&bus, repository, &dispatcher);
    info!(workers = pool.len(), "repository workers started");

    let mut network = NetworkModule::new(
        NetworkConfig {
            host: cli.host,
            port: cli.port,
            request_timeout: Duration::from_millis(cli.request_timeout_ms),
            ..NetworkConfig::default()
        },
        bus,
        dispatcher,
    );
    network.start().await.context("failed to bind HTTP listener")?;
    network
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "unable to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    pool.shutdown().await;
    info!("stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(feature = "redb")]
fn open_repository(path: Option<&std::path::Path>) -> anyhow::Result<Arc<dyn PersonRepository>> {
    match path {
        Some(path) => {
            let repository = peoplebus_server::repository::RedbPersonRepository::open(path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok(Arc::new(repository))
        }
        None => Ok(in_memory()),
    }
}

#[cfg(not(feature = "redb"))]
fn open_repository(path: Option<&std::path::Path>) -> anyhow::Result<Arc<dyn PersonRepository>> {
    if let Some(path) = path {
        anyhow::bail!(
            "{} given but this build has no redb support",
            path.display()
        );
    }
    Ok(in_memory())
}

fn in_memory() -> Arc<dyn PersonRepository> {
    info!("using in-memory person repository");
    Arc::new(MemoryPersonRepository::new())
}
