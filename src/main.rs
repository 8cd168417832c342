//! relais - a minimal distributed job scheduler.
//!
//! Usage:
//!   relais serve                 Run the scheduler with an in-memory database
//!   relais serve --db jobs.db    Run against a SQLite database file

use clap::{Parser, Subcommand};
use relais::api::{start_server, ApiConfig, ApiState};
use relais::{
    Event, EventBus, EventHandler, ExecutorRegistry, HttpExecutor, JobExecutor, Poller,
    PollerConfig, SqliteStore, WorkerConfig, WorkerPool,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// relais - a minimal distributed job scheduler
#[derive(Parser)]
#[command(name = "relais")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller, worker pool, and HTTP API
    Serve {
        /// Path to the SQLite database file (default: in-memory)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Host for the HTTP API
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for the HTTP API
        #[arg(long, default_value = "8780")]
        port: u16,

        /// Number of worker loops
        #[arg(short = 'w', long, default_value = "4")]
        workers: usize,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,

        /// Poll lock TTL in milliseconds
        #[arg(long, default_value = "30000")]
        lock_ttl_ms: u64,

        /// Redis URL for the lock and queue (requires the `redis` feature)
        #[arg(long)]
        redis_url: Option<String>,
    },
}

/// Event handler that logs job lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::JobSubmitted {
                job_id, job_type, ..
            } => {
                info!("Job {} submitted (type: {})", job_id, job_type);
            }
            Event::JobClaimed {
                job_id, claimed_by, ..
            } => {
                info!("Job {} claimed by {}", job_id, claimed_by);
            }
            Event::JobReverted { job_id, reason, .. } => {
                warn!("Job {} reverted to pending: {}", job_id, reason);
            }
            Event::JobCompleted {
                job_id, duration, ..
            } => {
                info!("Job {} completed in {:?}", job_id, duration);
            }
            Event::JobFailed {
                job_id,
                error,
                duration,
                ..
            } => {
                error!("Job {} failed after {:?}: {}", job_id, duration, error);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            db,
            host,
            port,
            workers,
            poll_interval_ms,
            lock_ttl_ms,
            redis_url,
        } => {
            let options = ServeOptions {
                db,
                host,
                port,
                workers,
                poll_interval: Duration::from_millis(poll_interval_ms),
                lock_ttl: Duration::from_millis(lock_ttl_ms),
                redis_url,
            };
            serve(options).await?;
        }
    }

    Ok(())
}

struct ServeOptions {
    db: Option<PathBuf>,
    host: String,
    port: u16,
    workers: usize,
    poll_interval: Duration,
    lock_ttl: Duration,
    redis_url: Option<String>,
}

fn build_backends(
    options: &ServeOptions,
) -> Result<
    (
        Arc<dyn relais::DistributedLock>,
        Arc<dyn relais::WorkQueue>,
    ),
    Box<dyn std::error::Error>,
> {
    if let Some(url) = &options.redis_url {
        #[cfg(feature = "redis")]
        {
            info!("Using Redis backends at {}", url);
            return Ok((
                Arc::new(relais::RedisLock::new(url)?),
                Arc::new(relais::RedisQueue::new(url)?),
            ));
        }
        #[cfg(not(feature = "redis"))]
        return Err(format!(
            "--redis-url {} given, but this build has no redis support",
            url
        )
        .into());
    }

    info!("Using in-process lock and queue");
    Ok((
        Arc::new(relais::InMemoryLock::new()),
        Arc::new(relais::InMemoryQueue::new()),
    ))
}

async fn serve(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = match &options.db {
        Some(path) => {
            info!("Opening database at {}", path.display());
            Arc::new(SqliteStore::new(path).await?)
        }
        None => {
            warn!("No --db given, using an in-memory database (data is lost on exit)");
            Arc::new(SqliteStore::in_memory().await?)
        }
    };

    let (lock, queue) = build_backends(&options)?;

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let registry = Arc::new(ExecutorRegistry::new(vec![
        Arc::new(HttpExecutor::new()?) as Arc<dyn JobExecutor>
    ]));

    let poller_config = PollerConfig::default()
        .with_poll_interval(options.poll_interval)
        .with_lock_ttl(options.lock_ttl);
    let poller = Poller::new(
        store.clone(),
        lock,
        queue.clone(),
        poller_config,
    )
    .with_event_bus(event_bus.clone());
    let (poller_handle, poller_task) = poller.start();

    let worker_config = WorkerConfig::default().with_worker_count(options.workers);
    let pool = WorkerPool::new(store.clone(), queue, registry, worker_config)
        .with_event_bus(event_bus.clone());
    let pool_handle = pool.start();

    let api_config = ApiConfig::new(options.host, options.port);
    let api_state = ApiState {
        store: store.clone(),
        event_bus,
    };
    let api_task = start_server(api_config, api_state).await?;

    info!("Press Ctrl+C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
        _ = api_task => {
            error!("API server stopped unexpectedly");
        }
    }

    poller_handle.shutdown().await?;
    poller_task.await?;
    pool_handle.shutdown().await;
    store.close().await;

    info!("Goodbye!");
    Ok(())
}
