//! Local cache backends: SQLite and in-memory.

use color_eyre::{eyre::eyre, Result};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::traits::{LocalCache, PendingSync, SyncKind};
use crate::requests::{now_millis, ServiceRequest};

/// SQLite-backed cache with one row per request.
pub struct SqliteCache {
  conn: Mutex<Connection>,
}

impl SqliteCache {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let cache = Self {
      conn: Mutex::new(conn),
    };
    cache.run_migrations()?;

    Ok(cache)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }
}

const CACHE_SCHEMA: &str = r#"
-- One row per request, serialized as JSON
CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at DESC);

-- Remote writes not yet acknowledged
CREATE TABLE IF NOT EXISTS pending_sync (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    queued_at INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0
);
"#;

fn insert_request(conn: &Connection, record: &ServiceRequest) -> Result<()> {
  let data =
    serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize request: {}", e))?;
  conn
    .execute(
      "INSERT OR REPLACE INTO requests (id, created_at, data) VALUES (?, ?, ?)",
      params![record.id, record.created_at, data],
    )
    .map_err(|e| eyre!("Failed to store request {}: {}", record.id, e))?;
  Ok(())
}

/// Parse a stored row. JSON may be stored as BLOB or TEXT; anything else
/// is skipped like malformed JSON.
fn decode_request(id: &str, data: Value) -> Option<ServiceRequest> {
  let parsed = match data {
    Value::Blob(bytes) => serde_json::from_slice(&bytes),
    Value::Text(text) => serde_json::from_str(&text),
    other => {
      warn!(id, column_type = %other.data_type(), "Skipping cached request without JSON data");
      return None;
    }
  };
  match parsed {
    Ok(record) => Some(record),
    Err(e) => {
      warn!(id, error = %e, "Skipping unreadable cached request");
      None
    }
  }
}

impl LocalCache for SqliteCache {
  fn read_all(&self) -> Result<Vec<ServiceRequest>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, data FROM requests ORDER BY created_at DESC")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, Value)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to query requests: {}", e))?
      .filter_map(|r| match r {
        Ok(row) => Some(row),
        Err(e) => {
          warn!(error = %e, "Skipping unreadable cache row");
          None
        }
      })
      .collect();

    Ok(
      rows
        .into_iter()
        .filter_map(|(id, data)| decode_request(&id, data))
        .collect(),
    )
  }

  fn write_all(&self, records: &[ServiceRequest]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM requests", [])
      .map_err(|e| eyre!("Failed to clear requests: {}", e))?;
    for record in records {
      insert_request(&tx, record)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn upsert(&self, record: &ServiceRequest) -> Result<()> {
    let conn = self.lock()?;
    insert_request(&conn, record)
  }

  fn remove(&self, id: &str) -> Result<bool> {
    let changed = self
      .lock()?
      .execute("DELETE FROM requests WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete request {}: {}", id, e))?;
    Ok(changed > 0)
  }

  fn get(&self, id: &str) -> Result<Option<ServiceRequest>> {
    let data: Option<Value> = self
      .lock()?
      .query_row(
        "SELECT data FROM requests WHERE id = ?",
        params![id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load request {}: {}", id, e))?;

    Ok(data.and_then(|data| decode_request(id, data)))
  }

  fn mark_pending(&self, id: &str, kind: SyncKind) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT INTO pending_sync (id, kind, queued_at, attempts) VALUES (?, ?, ?, 0)
         ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, queued_at = excluded.queued_at",
        params![id, kind.as_str(), now_millis()],
      )
      .map_err(|e| eyre!("Failed to queue sync for {}: {}", id, e))?;
    Ok(())
  }

  fn pending(&self) -> Result<Vec<PendingSync>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, kind, queued_at, attempts FROM pending_sync ORDER BY queued_at")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String, i64, u32)> = stmt
      .query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .map_err(|e| eyre!("Failed to query pending sync: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(
      rows
        .into_iter()
        .filter_map(|(id, kind, queued_at, attempts)| match kind.parse::<SyncKind>() {
          Ok(kind) => Some(PendingSync {
            id,
            kind,
            queued_at,
            attempts,
          }),
          Err(e) => {
            warn!(id = %id, error = %e, "Ignoring pending sync marker");
            None
          }
        })
        .collect(),
    )
  }

  fn record_attempt(&self, id: &str) -> Result<()> {
    self
      .lock()?
      .execute(
        "UPDATE pending_sync SET attempts = attempts + 1 WHERE id = ?",
        params![id],
      )
      .map_err(|e| eyre!("Failed to update pending sync for {}: {}", id, e))?;
    Ok(())
  }

  fn acknowledge(&self, marker: &PendingSync) -> Result<()> {
    self
      .lock()?
      .execute(
        "DELETE FROM pending_sync WHERE id = ? AND kind = ? AND queued_at = ?",
        params![marker.id, marker.kind.as_str(), marker.queued_at],
      )
      .map_err(|e| eyre!("Failed to acknowledge sync for {}: {}", marker.id, e))?;
    Ok(())
  }
}

/// In-memory cache that keeps the whole list as one value.
/// Nothing survives the process.
#[derive(Default)]
pub struct MemoryCache {
  records: Mutex<Vec<ServiceRequest>>,
  pending: Mutex<Vec<PendingSync>>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }
}

impl LocalCache for MemoryCache {
  fn read_all(&self) -> Result<Vec<ServiceRequest>> {
    let mut records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .clone();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records)
  }

  fn write_all(&self, records: &[ServiceRequest]) -> Result<()> {
    *self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))? = records.to_vec();
    Ok(())
  }

  fn mark_pending(&self, id: &str, kind: SyncKind) -> Result<()> {
    let mut pending = self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let queued_at = now_millis();
    match pending.iter_mut().find(|p| p.id == id) {
      Some(marker) => {
        marker.kind = kind;
        marker.queued_at = queued_at;
      }
      None => pending.push(PendingSync {
        id: id.to_string(),
        kind,
        queued_at,
        attempts: 0,
      }),
    }
    Ok(())
  }

  fn pending(&self) -> Result<Vec<PendingSync>> {
    let mut pending = self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .clone();
    pending.sort_by_key(|p| p.queued_at);
    Ok(pending)
  }

  fn record_attempt(&self, id: &str) -> Result<()> {
    let mut pending = self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if let Some(marker) = pending.iter_mut().find(|p| p.id == id) {
      marker.attempts += 1;
    }
    Ok(())
  }

  fn acknowledge(&self, marker: &PendingSync) -> Result<()> {
    self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .retain(|p| !(p.id == marker.id && p.kind == marker.kind && p.queued_at == marker.queued_at));
    Ok(())
  }
}
