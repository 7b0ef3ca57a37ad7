//! roster-bot server binary.
//!
//! Reads `roster.toml` (or the path given with `--config`) layered under
//! `ROSTER_*` environment variables, opens the SQLite record store, ensures
//! its indexes, and serves the chat webhook over HTTP until Ctrl-C.
//!
//! ```text
//! ROSTER_STORE_PATH=/var/lib/roster/roster.db roster-bot --config roster.toml
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use roster_bot::{AppState, BotConfig};
use roster_core::store::RecordStore as _;
use roster_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Roster chat bot webhook server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "roster.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ROSTER"))
    .build()
    .context("failed to read config file")?;

  let bot_cfg: BotConfig = settings
    .try_deserialize()
    .context("failed to deserialise BotConfig")?;

  let store_path = expand_tilde(&bot_cfg.store_path);

  let store = SqliteStore::open(&store_path, bot_cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  store
    .initialize()
    .await
    .context("failed to initialise store indexes")?;

  let state = AppState {
    store:  Arc::new(store.clone()),
    config: Arc::new(bot_cfg.clone()),
  };

  let app = roster_bot::router(state);
  let address = format!("{}:{}", bot_cfg.host, bot_cfg.port);

  tracing::info!(collection = %bot_cfg.collection, "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("shutting down");
  store.close().await.context("failed to close store")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
