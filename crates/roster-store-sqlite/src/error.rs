//! Error type for `roster-store-sqlite`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] roster_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The collection name is not a plain SQL identifier.
  #[error("invalid collection name: {0:?}")]
  InvalidCollection(String),

  #[error("database request timed out after {0:?}")]
  Timeout(Duration),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
