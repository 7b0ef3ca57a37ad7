//! Chat front-end for the Roster record store.
//!
//! Incoming chat messages arrive on a webhook, are parsed into
//! [`command::Command`]s, executed against any [`RecordStore`], and answered
//! with a rendered text reply.

pub mod command;
pub mod dispatch;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Json, Router,
  extract::State,
  routing::{get, post},
};
use roster_core::store::RecordStore;
use roster_store_sqlite::{DEFAULT_COLLECTION, StoreOptions};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `roster.toml` and `ROSTER_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  #[serde(default = "default_collection")]
  pub collection:           String,
  /// Per-request database timeout in seconds; `0` disables it.
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
  /// Longest accepted message, in characters.
  #[serde(default = "default_max_message_len")]
  pub max_message_len:      usize,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("roster.db") }
fn default_collection() -> String { DEFAULT_COLLECTION.to_owned() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_max_message_len() -> usize { 4096 }

impl Default for BotConfig {
  fn default() -> Self {
    Self {
      host:                 default_host(),
      port:                 default_port(),
      store_path:           default_store_path(),
      collection:           default_collection(),
      request_timeout_secs: default_request_timeout_secs(),
      max_message_len:      default_max_message_len(),
    }
  }
}

impl BotConfig {
  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      collection:      self.collection.clone(),
      request_timeout: (self.request_timeout_secs > 0)
        .then(|| Duration::from_secs(self.request_timeout_secs)),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: RecordStore> {
  pub store:  Arc<S>,
  pub config: Arc<BotConfig>,
}

// ─── Wire types ───────────────────────────────────────────────────────────────

/// A chat message delivered to the webhook.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingMessage {
  pub text: String,
  /// Display name of the sender, if the chat platform provides one.
  #[serde(default)]
  pub from: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Reply {
  pub reply: String,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the webhook [`Router`].
///
/// | Method | Path | Notes |
/// |--------|------|-------|
/// | `POST` | `/command` | Body: `{"text": "/add @alice dev", "from": "Ada"}` |
/// | `GET`  | `/healthz` | Liveness probe |
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  Router::new()
    .route("/command", post(command_handler::<S>))
    .route("/healthz", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// `POST /command`
async fn command_handler<S>(
  State(state): State<AppState<S>>,
  Json(message): Json<IncomingMessage>,
) -> Result<Json<Reply>, Error>
where
  S: RecordStore + Clone + Send + Sync + 'static,
{
  if message.text.chars().count() > state.config.max_message_len {
    return Err(Error::BadRequest(format!(
      "message longer than {} characters",
      state.config.max_message_len
    )));
  }

  let reply =
    match dispatch::respond(state.store.as_ref(), &message.text, message.from.as_deref()).await {
      Ok(reply) => reply,
      Err(Error::Store(e)) => {
        error!(error = %e, text = %message.text, "command failed");
        dispatch::FAILURE_REPLY.to_owned()
      }
      Err(e) => return Err(e),
    };

  Ok(Json(Reply { reply }))
}
