//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Record ids are stored as their
//! opaque string form. A record's tags are read back as the JSON array built
//! by `json_group_array`.

use chrono::{DateTime, Utc};
use roster_core::record::{Record, RecordId};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Whether `e` is a `UNIQUE` constraint failure (as opposed to a primary key
/// or foreign key failure).
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a record row joined with its tags.
pub struct RawRecord {
  pub id:         String,
  pub username:   String,
  pub created_at: String,
  pub tags:       String,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      username:   row.get(1)?,
      created_at: row.get(2)?,
      tags:       row.get(3)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      id:         self.id.parse::<RecordId>()?,
      username:   self.username,
      tags:       decode_tags(&self.tags)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
