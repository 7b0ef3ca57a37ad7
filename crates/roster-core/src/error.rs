//! Error types for `roster-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The username is already taken by another record.
  #[error("person with username {0} already exists")]
  DuplicateUsername(String),

  #[error("username must not be empty")]
  EmptyUsername,

  #[error("invalid record id: {0:?}")]
  InvalidRecordId(String),
}

impl Error {
  /// Find a core error in `err` or anywhere along its source chain.
  ///
  /// Backends wrap core errors in their own error types; this lets generic
  /// callers recover e.g. [`Error::DuplicateUsername`] without knowing the
  /// backend.
  pub fn find_in<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a Error> {
    std::iter::successors(Some(err), |e| e.source()).find_map(|e| e.downcast_ref::<Error>())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
