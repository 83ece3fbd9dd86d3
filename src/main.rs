// ABOUTME: Entry point for the shortener binary.
// ABOUTME: Loads configuration from env and CLI flags, opens storage, and serves the HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use shortener_server::{AppState, ShortenerConfig, create_router};
use shortener_store::{BackendConfig, open_backend};

/// How long accepted deletions get to finish once the server stops.
const DELETION_GRACE: Duration = Duration::from_secs(10);

/// Command-line overrides for the SHORTENER_* environment variables.
#[derive(Debug, Parser)]
#[command(name = "shortener", version, about = "URL shortener HTTP server")]
struct Cli {
    /// Socket address to listen on.
    #[arg(short = 'a', long)]
    bind: Option<SocketAddr>,

    /// Prefix for generated short URLs.
    #[arg(short = 'b', long)]
    base_url: Option<String>,

    /// SQLite database file.
    #[arg(short = 'd', long, conflicts_with = "file_storage")]
    database: Option<PathBuf>,

    /// JSONL log file for the in-memory store.
    #[arg(short = 'f', long)]
    file_storage: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut ShortenerConfig) {
        if let Some(bind) = self.bind {
            // A base URL derived from the old bind address follows the new one.
            if config.base_url == format!("http://{}", config.bind) {
                config.base_url = format!("http://{}", bind);
            }
            config.bind = bind;
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(path) = self.database {
            config.backend = BackendConfig::Sqlite { path };
        } else if let Some(path) = self.file_storage {
            config.backend = BackendConfig::File { path };
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shortener=debug,tower_http=debug".into()),
        )
        .init();

    let mut config = ShortenerConfig::from_env()?;
    Cli::parse().apply(&mut config);

    tracing::info!("shortener starting up");
    let store = open_backend(&config.backend)?;
    store.ping().await?;

    let state = Arc::new(AppState::new(
        store,
        config.base_url.clone(),
        config.deletion.clone(),
    ));
    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        "listening on {} (short urls under {})",
        config.bind,
        config.base_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !state.deletions.shutdown(DELETION_GRACE).await {
        tracing::warn!("some accepted deletions did not finish before exit");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("shutting down...");
}
