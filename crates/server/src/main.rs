//! tally server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tally_core::config::AppConfig;
use tally_server::jobs::{self, MigrateUsernamesRequest, ResetCountsRequest};
use tally_server::{AppState, create_router};
use tally_sync::JobResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// tally - denormalized counter maintenance and bulk document jobs
#[derive(Parser, Debug)]
#[command(name = "tallyd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "TALLY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Backfill canonical lowercase usernames, then exit
    MigrateUsernames {
        /// Collection holding user documents (overrides config)
        #[arg(long)]
        collection: Option<String>,
        /// Classify documents without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Zero counters and purge child collections, then exit
    ResetCounts {
        /// Restrict the run to this target collection (repeatable)
        #[arg(long = "collection")]
        collections: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing. Logs go to stderr so job output on stdout stays JSON.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("tally v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    // Register Prometheus metrics
    tally_server::metrics::register_metrics();

    // Initialize store backend
    let store = tally_store::from_config(&config.store)
        .await
        .context("failed to initialize document store")?;

    // Verify store connectivity before accepting work.
    store
        .health_check()
        .await
        .context("document store health check failed")?;
    tracing::info!(backend = store.backend_name(), "Document store initialized");

    let state = AppState::new(config, store);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::MigrateUsernames {
            collection,
            dry_run,
        } => {
            let request = MigrateUsernamesRequest {
                collection,
                dry_run: dry_run.then_some(true),
            };
            let result = jobs::migrate_usernames(&state, request).await?;
            print_result(&result)
        }
        Command::ResetCounts { collections } => {
            let result = jobs::reset_counts(&state, ResetCountsRequest { collections }).await?;
            print_result(&result)
        }
    }
}

/// Load configuration. The file is optional; env vars can provide or override everything.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}, using defaults and environment", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TALLY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state
        .config
        .server
        .bind
        .parse()
        .context("invalid bind address")?;

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Print the job result as JSON on stdout; a run with failures exits non-zero.
fn print_result(result: &JobResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("failed to serialize job result")?;
    println!("{json}");
    if !result.is_clean() {
        anyhow::bail!(
            "{} finished with {} failed documents",
            result.job,
            result.failed.len()
        );
    }
    Ok(())
}
