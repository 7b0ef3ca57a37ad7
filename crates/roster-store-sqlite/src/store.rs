//! [`SqliteStore`] — the SQLite implementation of [`RecordStore`].

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use rand::Rng as _;
use rusqlite::{OptionalExtension as _, types::Value};
use tracing::{debug, info};

use roster_core::{
  record::{Record, RecordId, dedup_tags},
  store::RecordStore,
};

use crate::{
  Error, Result,
  encode::{RawRecord, encode_dt, encode_tags, is_unique_violation},
  schema::Collection,
};

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "persons";

/// How many times a random pick is retried when the eligible set shrinks
/// between counting and fetching.
const RANDOM_PICK_ATTEMPTS: usize = 3;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Construction-time settings for a [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// Table name prefix for this collection.
  pub collection:      String,
  /// Upper bound on every individual database request. `None` waits forever.
  pub request_timeout: Option<Duration>,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      collection:      DEFAULT_COLLECTION.to_owned(),
      request_timeout: Some(Duration::from_secs(10)),
    }
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Which records a read applies to.
#[derive(Debug, Clone, Copy)]
enum Filter<'a> {
  All,
  Username(&'a str),
  HasTag(&'a str),
  /// At least one of the tags.
  AnyTag(&'a [String]),
  /// Every one of the tags.
  AllTags(&'a [String]),
}

impl Filter<'_> {
  /// Render as a `WHERE` clause over the record alias `r`, plus its
  /// positional parameters.
  fn to_sql(self, collection: &Collection) -> Result<(String, Vec<Value>)> {
    let tags = collection.tags();
    Ok(match self {
      Self::All => ("1".to_owned(), vec![]),
      Self::Username(u) => ("r.username = ?1".to_owned(), vec![Value::Text(u.to_owned())]),
      Self::HasTag(tag) => (
        format!("EXISTS (SELECT 1 FROM {tags} t WHERE t.record_id = r.id AND t.tag = ?1)"),
        vec![Value::Text(tag.to_owned())],
      ),
      Self::AnyTag(wanted) => (
        format!(
          "EXISTS (SELECT 1 FROM {tags} t
                    WHERE t.record_id = r.id
                      AND t.tag IN (SELECT value FROM json_each(?1)))"
        ),
        vec![Value::Text(encode_tags(wanted)?)],
      ),
      Self::AllTags(wanted) => {
        let wanted = dedup_tags(wanted);
        // (record_id, tag) is unique, so a plain count of matching rows equals
        // the number of distinct wanted tags the record carries.
        (
          format!(
            "(SELECT COUNT(*) FROM {tags} t
               WHERE t.record_id = r.id
                 AND t.tag IN (SELECT value FROM json_each(?1))) = ?2"
          ),
          vec![Value::Text(encode_tags(&wanted)?), Value::Integer(wanted.len() as i64)],
        )
      }
    })
  }
}

fn pick_index(count: u64) -> u64 { rand::thread_rng().gen_range(0..count) }

// ─── Request cancellation ────────────────────────────────────────────────────

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

/// Returned from the connection thread for a request whose caller gave up
/// before it was picked up.
#[derive(Debug, thiserror::Error)]
#[error("request cancelled before it started")]
struct Cancelled;

/// Tracks one request submitted to the connection thread.
///
/// Dropping the guard before the request has finished cancels it: a request
/// still in the queue is skipped when its turn comes, and a request already
/// executing is interrupted so its transaction rolls back.
struct RequestGuard<'a> {
  state:     Arc<AtomicU8>,
  interrupt: &'a rusqlite::InterruptHandle,
}

impl Drop for RequestGuard<'_> {
  fn drop(&mut self) {
    let cancel = |from| {
      self
        .state
        .compare_exchange(from, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    };
    if cancel(QUEUED) {
      debug!("queued database request cancelled");
    } else if cancel(RUNNING) {
      debug!("running database request interrupted");
      self.interrupt.interrupt();
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Roster record store backed by SQLite.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:            tokio_rusqlite::Connection,
  interrupt:       Arc<rusqlite::InterruptHandle>,
  collection:      Arc<Collection>,
  request_timeout: Option<Duration>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and create the collection tables.
  pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let collection = Collection::new(&options.collection)?;
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::with_connection(conn, collection, options.request_timeout).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory(options: StoreOptions) -> Result<Self> {
    let collection = Collection::new(&options.collection)?;
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::with_connection(conn, collection, options.request_timeout).await
  }

  async fn with_connection(
    conn: tokio_rusqlite::Connection,
    collection: Collection,
    request_timeout: Option<Duration>,
  ) -> Result<Self> {
    let interrupt = conn.call(|conn| Ok(conn.get_interrupt_handle())).await?;
    let store = Self {
      conn,
      interrupt: Arc::new(interrupt),
      collection: Arc::new(collection),
      request_timeout,
    };
    store.init_tables().await?;
    Ok(store)
  }

  /// Shut the connection down. Other clones of this store fail afterwards.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  pub fn collection(&self) -> &str { self.collection.name() }

  async fn init_tables(&self) -> Result<()> {
    let ddl = self.collection.tables_ddl();
    self
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await
  }

  /// Run `f` on the connection thread, bounded by the request timeout.
  ///
  /// When the timeout fires, or the returned future is dropped, the request
  /// is aborted rather than left to complete in the background.
  pub(crate) async fn call<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let state = Arc::new(AtomicU8::new(QUEUED));
    let _guard = RequestGuard { state: state.clone(), interrupt: &self.interrupt };

    let request = self.conn.call(move |conn| {
      if state
        .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
      {
        return Err(tokio_rusqlite::Error::Other(Box::new(Cancelled)));
      }
      let outcome = f(conn);
      state.store(FINISHED, Ordering::Release);
      outcome
    });
    let outcome = match self.request_timeout {
      Some(limit) => tokio::time::timeout(limit, request)
        .await
        .map_err(|_| Error::Timeout(limit))?,
      None => request.await,
    };
    Ok(outcome?)
  }

  async fn fetch_records(&self, filter: Filter<'_>) -> Result<Vec<Record>> {
    let (clause, params) = filter.to_sql(&self.collection)?;
    let sql = self.collection.select_records(&clause);

    let raws: Vec<RawRecord> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn count_records(&self, filter: Filter<'_>) -> Result<u64> {
    let (clause, params) = filter.to_sql(&self.collection)?;
    let sql = format!(
      "SELECT COUNT(*) FROM {records} r WHERE {clause}",
      records = self.collection.records(),
    );

    let count: i64 = self
      .call(move |conn| {
        Ok(conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| row.get(0))?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }

  /// The record at position `index` (insertion order) among those matching
  /// `filter`, if the set is still that large.
  async fn fetch_nth(&self, filter: Filter<'_>, index: u64) -> Result<Option<Record>> {
    let (clause, mut params) = filter.to_sql(&self.collection)?;
    params.push(Value::Integer(index as i64));
    let sql = format!(
      "{} LIMIT 1 OFFSET ?{}",
      self.collection.select_records(&clause),
      params.len(),
    );

    let raw: Option<RawRecord> = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params_from_iter(params.iter()), RawRecord::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  /// Union `tags` into the tag set of `username` in one transaction and
  /// report how many tags were new. Zero when the record does not exist.
  async fn union_tags(&self, username: &str, tags: Vec<String>) -> Result<usize> {
    if tags.is_empty() {
      return Ok(0);
    }

    let sql = format!(
      "INSERT OR IGNORE INTO {tags} (record_id, tag)
       SELECT id, ?2 FROM {records} WHERE username = ?1",
      tags = self.collection.tags(),
      records = self.collection.records(),
    );
    let username = username.to_owned();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut added = 0;
        {
          let mut stmt = tx.prepare(&sql)?;
          for tag in &tags {
            added += stmt.execute(rusqlite::params![username, tag])?;
          }
        }
        tx.commit()?;
        Ok(added)
      })
      .await
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn initialize(&self) -> Result<()> {
    let ddl = self.collection.indexes_ddl();
    self
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    info!(collection = self.collection(), "collection indexes ensured");
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn add_person(&self, username: &str, tags: &[String]) -> Result<Record> {
    if username.is_empty() {
      return Err(roster_core::Error::EmptyUsername.into());
    }

    let record = Record {
      id:         RecordId::generate(),
      username:   username.to_owned(),
      tags:       dedup_tags(tags),
      created_at: Utc::now(),
    };

    let insert_record = format!(
      "INSERT INTO {} (id, username, created_at) VALUES (?1, ?2, ?3)",
      self.collection.records(),
    );
    let insert_tag = format!(
      "INSERT INTO {} (record_id, tag) VALUES (?1, ?2)",
      self.collection.tags(),
    );
    let id_str   = record.id.to_string();
    let name_str = record.username.clone();
    let at_str   = encode_dt(record.created_at);
    let tag_list = record.tags.clone();

    let inserted: bool = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        match tx.execute(&insert_record, rusqlite::params![id_str, name_str, at_str]) {
          Ok(_) => {}
          // Dropping `tx` rolls back.
          Err(e) if is_unique_violation(&e) => return Ok(false),
          Err(e) => return Err(e.into()),
        }
        {
          let mut stmt = tx.prepare(&insert_tag)?;
          for tag in &tag_list {
            stmt.execute(rusqlite::params![id_str, tag])?;
          }
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      debug!(username, "add_person rejected: username taken");
      return Err(roster_core::Error::DuplicateUsername(record.username).into());
    }

    debug!(username, id = %record.id, tags = record.tags.len(), "person added");
    Ok(record)
  }

  async fn add_tag(&self, username: &str, tag: &str) -> Result<bool> {
    let added = self.union_tags(username, vec![tag.to_owned()]).await?;
    debug!(username, tag, added, "add_tag");
    Ok(added > 0)
  }

  async fn add_tags(&self, username: &str, tags: &[String]) -> Result<bool> {
    let added = self.union_tags(username, dedup_tags(tags)).await?;
    debug!(username, requested = tags.len(), added, "add_tags");
    Ok(added > 0)
  }

  async fn delete_person(&self, username: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE username = ?1", self.collection.records());
    let name = username.to_owned();

    let deleted = self
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params![name])?))
      .await?;

    debug!(username, deleted, "delete_person");
    Ok(deleted > 0)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_person(&self, username: &str) -> Result<Option<Record>> {
    Ok(self.fetch_records(Filter::Username(username)).await?.into_iter().next())
  }

  async fn get_random_person(&self, tags: &[String]) -> Result<Option<Record>> {
    let filter = if tags.is_empty() { Filter::All } else { Filter::AnyTag(tags) };

    for _ in 0..RANDOM_PICK_ATTEMPTS {
      let count = self.count_records(filter).await?;
      if count == 0 {
        return Ok(None);
      }

      let index = pick_index(count);
      if let Some(record) = self.fetch_nth(filter, index).await? {
        return Ok(Some(record));
      }
      debug!(count, index, "eligible set shrank before the pick; recounting");
    }

    Ok(None)
  }

  async fn get_all_persons(&self) -> Result<Vec<Record>> {
    self.fetch_records(Filter::All).await
  }

  async fn get_all_persons_by_tag(&self, tag: &str) -> Result<Vec<Record>> {
    self.fetch_records(Filter::HasTag(tag)).await
  }

  async fn get_all_persons_by_tags(&self, tags: &[String]) -> Result<Vec<Record>> {
    if tags.is_empty() {
      return self.fetch_records(Filter::All).await;
    }
    self.fetch_records(Filter::AllTags(tags)).await
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn cleanup(&self) -> Result<()> {
    let sql = self.collection.cleanup_sql();
    self
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    info!(collection = self.collection(), "collection cleaned up");
    Ok(())
  }
}
