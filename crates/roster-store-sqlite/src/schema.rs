//! SQL schema for a Roster collection.
//!
//! A collection is a pair of tables: `<name>` holds one row per record and
//! `<name>_tags` holds one row per (record, tag). Table DDL runs at connection
//! startup; the secondary indexes are owned by `initialize` / `cleanup`.

use crate::{Error, Result};

/// Longest accepted collection name.
const MAX_NAME_LEN: usize = 64;

/// A validated collection name and the SQL derived from it.
///
/// The name is interpolated into statements, so it is restricted to
/// `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone)]
pub struct Collection {
  name: String,
}

impl Collection {
  pub fn new(name: &str) -> Result<Self> {
    let mut chars = name.chars();
    let valid_head = chars
      .next()
      .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_head || !valid_tail || name.len() > MAX_NAME_LEN {
      return Err(Error::InvalidCollection(name.to_owned()));
    }
    Ok(Self { name: name.to_owned() })
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn records(&self) -> &str { &self.name }

  pub fn tags(&self) -> String { format!("{}_tags", self.name) }

  pub fn username_index(&self) -> String { format!("{}_username_uidx", self.name) }

  pub fn tag_index(&self) -> String { format!("{}_tag_idx", self.name) }

  /// Table DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
  pub fn tables_ddl(&self) -> String {
    let records = self.records();
    let tags = self.tags();
    format!(
      "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS {records} (
    id          TEXT PRIMARY KEY,   -- hyphenated UUID, store-assigned
    username    TEXT NOT NULL,      -- unique via {records}_username_uidx
    created_at  TEXT NOT NULL       -- ISO 8601 UTC
);

-- One row per tag; `seq` keeps first-insertion order.
CREATE TABLE IF NOT EXISTS {tags} (
    seq         INTEGER PRIMARY KEY,
    record_id   TEXT NOT NULL REFERENCES {records}(id) ON DELETE CASCADE,
    tag         TEXT NOT NULL,
    UNIQUE (record_id, tag)
);
"
    )
  }

  /// Secondary indexes, created by `initialize`.
  pub fn indexes_ddl(&self) -> String {
    format!(
      "
CREATE UNIQUE INDEX IF NOT EXISTS {uidx} ON {records}(username);
CREATE INDEX IF NOT EXISTS {tidx} ON {tags}(tag);
",
      uidx = self.username_index(),
      records = self.records(),
      tidx = self.tag_index(),
      tags = self.tags(),
    )
  }

  /// Empty the collection and drop its secondary indexes.
  pub fn cleanup_sql(&self) -> String {
    format!(
      "
DELETE FROM {tags};
DELETE FROM {records};
DROP INDEX IF EXISTS {uidx};
DROP INDEX IF EXISTS {tidx};
",
      tags = self.tags(),
      records = self.records(),
      uidx = self.username_index(),
      tidx = self.tag_index(),
    )
  }

  /// `SELECT` producing the four columns read by `RawRecord`, restricted by
  /// `where_clause` and ordered by insertion.
  pub fn select_records(&self, where_clause: &str) -> String {
    format!(
      "SELECT r.id, r.username, r.created_at,
              (SELECT json_group_array(t.tag ORDER BY t.seq)
                 FROM {tags} t
                WHERE t.record_id = r.id) AS tags
         FROM {records} r
        WHERE {where_clause}
        ORDER BY r.rowid",
      tags = self.tags(),
      records = self.records(),
    )
  }
}
