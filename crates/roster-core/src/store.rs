//! The `RecordStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `roster-store-sqlite`).
//! The command adapter depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::record::Record;

/// Abstraction over a Roster record store backend.
///
/// Records are keyed by username; uniqueness must be enforced by the backing
/// collection itself so that concurrent inserts cannot both succeed.
///
/// Absence is never an error: lookups return `Option` and mutations of a
/// missing username return `false`.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create the unique index on `username`. Idempotent.
  fn initialize(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new record. Tags are deduplicated before they are stored.
  ///
  /// Fails with a duplicate-username error if the username is taken.
  fn add_person<'a>(
    &'a self,
    username: &'a str,
    tags: &'a [String],
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + 'a;

  /// Add one tag. Returns `true` only if the record exists and the tag was
  /// not already present.
  fn add_tag<'a>(
    &'a self,
    username: &'a str,
    tag: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Union `tags` into the record's tag set. Returns `true` only if the
  /// record exists and at least one tag was new.
  fn add_tags<'a>(
    &'a self,
    username: &'a str,
    tags: &'a [String],
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Remove a record. Returns `true` if one was removed.
  fn delete_person<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_person<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  /// Pick a record uniformly at random.
  ///
  /// With an empty `tags` slice every record is eligible. Otherwise a record
  /// is eligible if it has *any* of the given tags. Note that this is OR
  /// semantics, unlike [`get_all_persons_by_tags`](Self::get_all_persons_by_tags).
  fn get_random_person<'a>(
    &'a self,
    tags: &'a [String],
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  /// Every record, in insertion order.
  fn get_all_persons(&self) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  fn get_all_persons_by_tag<'a>(
    &'a self,
    tag: &'a str,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  /// Records carrying *all* of `tags`. An empty slice matches every record.
  fn get_all_persons_by_tags<'a>(
    &'a self,
    tags: &'a [String],
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Remove every record and drop the username index. Intended for test
  /// isolation; call [`initialize`](Self::initialize) afterwards to restore
  /// the index.
  fn cleanup(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
