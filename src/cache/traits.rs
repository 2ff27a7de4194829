//! Core traits and types for the local cache.

use color_eyre::Result;
use std::fmt;
use std::str::FromStr;

use crate::requests::ServiceRequest;

/// Same-device storage of every known request plus the outbox of remote
/// writes that have not been acknowledged yet.
///
/// The provided `upsert`/`remove`/`get` rewrite the whole list through
/// `read_all`/`write_all`. Backends with indexed storage override them.
pub trait LocalCache: Send + Sync {
  /// All stored requests, newest first. Missing storage is an empty list;
  /// unparseable entries are skipped.
  fn read_all(&self) -> Result<Vec<ServiceRequest>>;

  /// Replace the stored list.
  fn write_all(&self, records: &[ServiceRequest]) -> Result<()>;

  /// Replace the record with the same id, or insert it at the head.
  fn upsert(&self, record: &ServiceRequest) -> Result<()> {
    let mut records = self.read_all()?;
    match records.iter_mut().find(|r| r.id == record.id) {
      Some(existing) => *existing = record.clone(),
      None => records.insert(0, record.clone()),
    }
    self.write_all(&records)
  }

  /// Remove a record. Returns whether it existed.
  fn remove(&self, id: &str) -> Result<bool> {
    let mut records = self.read_all()?;
    let before = records.len();
    records.retain(|r| r.id != id);
    if records.len() == before {
      return Ok(false);
    }
    self.write_all(&records)?;
    Ok(true)
  }

  fn get(&self, id: &str) -> Result<Option<ServiceRequest>> {
    Ok(self.read_all()?.into_iter().find(|r| r.id == id))
  }

  /// Record that the remote copy of `id` is behind. Replaces any earlier
  /// marker for the same id.
  fn mark_pending(&self, id: &str, kind: SyncKind) -> Result<()>;

  /// Outstanding markers, oldest first.
  fn pending(&self) -> Result<Vec<PendingSync>>;

  /// Count a failed push attempt.
  fn record_attempt(&self, id: &str) -> Result<()>;

  /// Drop `marker` once the remote has acknowledged it, unless a newer
  /// write replaced it in the meantime.
  fn acknowledge(&self, marker: &PendingSync) -> Result<()>;
}

/// Remote write still owed for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
  /// Push the current local copy (covers failed inserts and updates)
  Upsert,
  /// Delete the remote row
  Delete,
}

impl SyncKind {
  pub fn as_str(self) -> &'static str {
    match self {
      SyncKind::Upsert => "upsert",
      SyncKind::Delete => "delete",
    }
  }
}

impl fmt::Display for SyncKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SyncKind {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "upsert" => Ok(SyncKind::Upsert),
      "delete" => Ok(SyncKind::Delete),
      other => Err(format!("unknown sync kind '{}'", other)),
    }
  }
}

/// Outbox marker for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSync {
  pub id: String,
  pub kind: SyncKind,
  /// Epoch milliseconds of the write that created the marker
  pub queued_at: i64,
  /// Failed push attempts so far
  pub attempts: u32,
}
