//! Record types — the single entity kept by the Roster store.
//!
//! A record is keyed by its username and carries a grow-only set of free-text
//! tags. Tags are serialised as a sequence in first-insertion order but are
//! compared as a set.

use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Identifier ──────────────────────────────────────────────────────────────

/// Opaque, store-assigned identifier of a record.
///
/// Callers see it as a string; the only guarantee is that a valid id is a
/// hyphenated lowercase UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
  /// Mint a fresh random id.
  pub fn generate() -> Self { Self(Uuid::new_v4().hyphenated().to_string()) }

  /// Whether `s` is acceptable as a record id.
  pub fn is_valid(s: &str) -> bool {
    Uuid::try_parse(s).is_ok_and(|id| id.hyphenated().to_string() == s)
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for RecordId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    if Self::is_valid(s) {
      Ok(Self(s.to_owned()))
    } else {
      Err(Error::InvalidRecordId(s.to_owned()))
    }
  }
}

impl TryFrom<String> for RecordId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> {
    if Self::is_valid(&s) { Ok(Self(s)) } else { Err(Error::InvalidRecordId(s)) }
  }
}

impl From<RecordId> for String {
  fn from(id: RecordId) -> Self { id.0 }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A stored person: unique username plus a set of tags.
///
/// Equality treats `tags` as a set, so insertion order does not matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
  pub id:         RecordId,
  pub username:   String,
  /// Unique tags in the order they were first added.
  pub tags:       Vec<String>,
  pub created_at: DateTime<Utc>,
}

impl Record {
  /// The tags as an unordered set.
  pub fn tag_set(&self) -> HashSet<&str> { self.tags.iter().map(String::as_str).collect() }
}

impl PartialEq for Record {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
      && self.username == other.username
      && self.created_at == other.created_at
      && self.tag_set() == other.tag_set()
  }
}

impl Eq for Record {}

// ─── Tags ────────────────────────────────────────────────────────────────────

/// Drop repeated tags, keeping the first occurrence of each.
pub fn dedup_tags<I, S>(tags: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut seen = HashSet::new();
  tags
    .into_iter()
    .filter_map(|t| {
      let t = t.as_ref();
      seen.insert(t.to_owned()).then(|| t.to_owned())
    })
    .collect()
}
