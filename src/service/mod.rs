//! Reconciling data service over the local cache and the remote store.
//!
//! Writes land in the local cache first and are mirrored to the remote on a
//! best-effort basis; a failed mirror leaves an outbox marker for
//! [`RequestService::sync`]. Reads prefer the remote and backfill with
//! local-only records.

mod sync;

use color_eyre::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{LocalCache, PendingSync, SyncKind};
use crate::event::{ChangeNotifier, Changed};
use crate::remote::{RemoteError, RemoteStore};
use crate::requests::{
  generate_access_code, normalize_access_code, RequestStatus, ServiceRequest,
};

pub use sync::{Reconciler, SyncReport};

/// Where a listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSource {
  /// Remote answered and nothing local had to be added
  Remote,
  /// Remote answered; local-only or unsynced records were folded in
  Merged,
  /// Remote unavailable, serving the local cache
  LocalFallback,
}

/// Result of a read, with metadata about its source.
#[derive(Debug, Clone)]
pub struct Listing {
  /// Newest first
  pub records: Vec<ServiceRequest>,
  pub source: ListSource,
  /// Why the remote was not used, if it wasn't
  pub remote_error: Option<RemoteError>,
}

impl Listing {
  fn from_remote(records: Vec<ServiceRequest>) -> Self {
    Self {
      records,
      source: ListSource::Remote,
      remote_error: None,
    }
  }

  fn offline(records: Vec<ServiceRequest>, remote_error: Option<RemoteError>) -> Self {
    Self {
      records,
      source: ListSource::LocalFallback,
      remote_error,
    }
  }
}

/// Whether a write reached the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  /// Remote acknowledged the write
  Synced,
  /// Remote failed; the write waits in the outbox
  Queued,
  /// Remote failed and there was no local copy to queue
  Unsynced,
}

/// Data access for service requests. Cheap to share behind an `Arc`.
pub struct RequestService {
  local: Arc<dyn LocalCache>,
  remote: Arc<dyn RemoteStore>,
  notifier: ChangeNotifier,
}

impl RequestService {
  pub fn new(local: Arc<dyn LocalCache>, remote: Arc<dyn RemoteStore>) -> Self {
    Self {
      local,
      remote,
      notifier: ChangeNotifier::new(),
    }
  }

  /// Subscribe to local change signals.
  pub fn subscribe(&self) -> broadcast::Receiver<Changed> {
    self.notifier.subscribe()
  }

  /// Check that the remote table is reachable.
  pub async fn check_remote(&self) -> Result<(), RemoteError> {
    self.remote.probe().await
  }

  /// All requests, newest first.
  ///
  /// When the remote fails and the local cache has data, the cache is
  /// returned as is. Otherwise remote records win and local records the
  /// remote doesn't know about are added. Records with unsynced local
  /// writes are shown as they are locally.
  pub async fn list(&self) -> Result<Listing> {
    let local = self.local.read_all()?;

    let remote = match self.remote.list_all().await {
      Ok(remote) => remote,
      Err(e) => {
        // Served verbatim, no merge
        warn!(error = %e, cached = local.len(), "Remote list failed, serving local cache");
        return Ok(Listing::offline(local, Some(e)));
      }
    };

    let pending: HashMap<String, SyncKind> = self
      .local
      .pending()?
      .into_iter()
      .map(|p| (p.id, p.kind))
      .collect();

    let mut local_by_id: HashMap<String, ServiceRequest> =
      local.into_iter().map(|r| (r.id.clone(), r)).collect();
    let mut merged: HashMap<String, ServiceRequest> = HashMap::new();
    let mut from_local = 0usize;

    for record in remote {
      match pending.get(&record.id) {
        Some(SyncKind::Delete) => continue,
        Some(SyncKind::Upsert) => {
          if let Some(newer) = local_by_id.remove(&record.id) {
            merged.insert(newer.id.clone(), newer);
            from_local += 1;
            continue;
          }
        }
        None => {}
      }
      merged.entry(record.id.clone()).or_insert(record);
    }

    for (id, record) in local_by_id {
      if !merged.contains_key(&id) {
        merged.insert(id, record);
        from_local += 1;
      }
    }

    let mut records: Vec<ServiceRequest> = merged.into_values().collect();
    sort_newest_first(&mut records);

    if from_local == 0 {
      return Ok(Listing::from_remote(records));
    }
    debug!(from_local, "Merged local records into remote listing");
    Ok(Listing {
      records,
      source: ListSource::Merged,
      remote_error: None,
    })
  }

  /// Requests sharing a client access code.
  ///
  /// The code is trimmed and upper-cased. Remote rows are used when the
  /// remote returns any; otherwise local records with exactly that code.
  pub async fn list_by_access_code(&self, code: &str) -> Result<Listing> {
    let Some(code) = normalize_access_code(code) else {
      return Ok(Listing::offline(Vec::new(), None));
    };

    let remote_error = match self.remote.list_by_access_code(&code).await {
      Ok(rows) if !rows.is_empty() => return Ok(Listing::from_remote(rows)),
      Ok(_) => None,
      Err(e) => {
        warn!(error = %e, "Remote lookup failed, searching local cache");
        Some(e)
      }
    };

    let records = self
      .local
      .read_all()?
      .into_iter()
      .filter(|r| r.client_access_code.as_deref() == Some(code.as_str()))
      .collect();
    Ok(Listing::offline(records, remote_error))
  }

  /// Store a new request. It always starts as pending.
  pub async fn create(&self, mut record: ServiceRequest) -> Result<(ServiceRequest, SyncState)> {
    record.status = RequestStatus::Pending;
    self.local.upsert(&record)?;
    self.notifier.notify();
    info!(id = %record.id, client = %record.client_name, service = %record.service_type, "Request created");

    let queued = self.pending_marker(&record.id)?;
    let outcome = self.remote.insert(&record).await;
    let state = self.settle(&record.id, SyncKind::Upsert, "insert", queued, outcome)?;
    Ok((record, state))
  }

  /// Replace a request's fields. Unknown ids are added to the cache.
  pub async fn update(&self, record: &ServiceRequest) -> Result<SyncState> {
    self.local.upsert(record)?;
    self.notifier.notify();

    let queued = self.pending_marker(&record.id)?;
    let outcome = if queued.is_some() {
      self.remote.upsert(record).await
    } else {
      self.remote.update(record).await
    };
    self.settle(&record.id, SyncKind::Upsert, "update", queued, outcome)
  }

  /// Move a request to another status.
  ///
  /// Records only the remote knows are copied into the cache first, so the
  /// new status stays visible if the remote write fails.
  pub async fn update_status(&self, id: &str, status: RequestStatus) -> Result<SyncState> {
    let mut record = match self.local.get(id)? {
      Some(record) => record,
      None => match self.remote_copy(id).await {
        Some(record) => record,
        None => {
          // Nothing to cache; the remote patch is all we can do
          return Ok(match self.remote.set_status(id, status).await {
            Ok(()) => SyncState::Synced,
            Err(e) => {
              warn!(id, error = %e, "Remote status update failed");
              SyncState::Unsynced
            }
          });
        }
      },
    };

    record.status = status;
    self.local.upsert(&record)?;
    self.notifier.notify();

    let queued = self.pending_marker(id)?;
    let outcome = if queued.is_some() {
      self.remote.upsert(&record).await
    } else {
      self.remote.set_status(id, status).await
    };
    self.settle(id, SyncKind::Upsert, "set_status", queued, outcome)
  }

  async fn remote_copy(&self, id: &str) -> Option<ServiceRequest> {
    match self.remote.list_all().await {
      Ok(rows) => rows.into_iter().find(|r| r.id == id),
      Err(e) => {
        warn!(id, error = %e, "Remote lookup failed");
        None
      }
    }
  }

  /// Delete a request everywhere.
  pub async fn delete(&self, id: &str) -> Result<SyncState> {
    if self.local.remove(id)? {
      self.notifier.notify();
    }
    let queued = self.pending_marker(id)?;
    let outcome = self.remote.delete(id).await;
    self.settle(id, SyncKind::Delete, "delete", queued, outcome)
  }

  /// Give every request of a client the same access code.
  ///
  /// Client names match case-insensitively. An existing code among the
  /// client's requests is reused; otherwise a new one is generated.
  /// Returns the code and how many requests changed.
  pub async fn assign_access_code(&self, client_name: &str) -> Result<(String, usize)> {
    let wanted = client_name.trim().to_lowercase();
    let matching: Vec<ServiceRequest> = self
      .list()
      .await?
      .records
      .into_iter()
      .filter(|r| r.client_name.trim().to_lowercase() == wanted)
      .collect();

    let code = matching
      .iter()
      .find_map(|r| r.client_access_code.clone())
      .unwrap_or_else(|| generate_access_code(client_name));

    let mut changed = 0;
    for mut record in matching {
      if record.client_access_code.as_deref() == Some(code.as_str()) {
        continue;
      }
      record.client_access_code = Some(code.clone());
      self.update(&record).await?;
      changed += 1;
    }
    Ok((code, changed))
  }

  /// Store records exported from another device and queue them for the
  /// remote. Existing ids are overwritten. Returns how many were stored.
  pub fn import(&self, records: &[ServiceRequest]) -> Result<usize> {
    for record in records {
      self.local.upsert(record)?;
      self.local.mark_pending(&record.id, SyncKind::Upsert)?;
    }
    if !records.is_empty() {
      self.notifier.notify();
      info!(count = records.len(), "Requests imported");
    }
    Ok(records.len())
  }

  fn pending_marker(&self, id: &str) -> Result<Option<PendingSync>> {
    Ok(self.local.pending()?.into_iter().find(|p| p.id == id))
  }

  /// Record the remote outcome of a write in the outbox.
  ///
  /// `queued` is the marker seen before the write. Success retires only that
  /// marker; one written in the meantime stays.
  fn settle(
    &self,
    id: &str,
    kind: SyncKind,
    op: &'static str,
    queued: Option<PendingSync>,
    outcome: Result<(), RemoteError>,
  ) -> Result<SyncState> {
    match outcome {
      Ok(()) => {
        if let Some(marker) = queued {
          self.local.acknowledge(&marker)?;
        }
        Ok(SyncState::Synced)
      }
      Err(e) => {
        if e.is_table_missing() {
          warn!(id, op, error = %e, "Remote table missing; write kept locally");
        } else {
          warn!(id, op, error = %e, "Remote write failed; queued for sync");
        }
        self.local.mark_pending(id, kind)?;
        Ok(SyncState::Queued)
      }
    }
  }
}

fn sort_newest_first(records: &mut [ServiceRequest]) {
  records.sort_by(|a, b| {
    b.created_at
      .cmp(&a.created_at)
      .then_with(|| a.id.cmp(&b.id))
  });
}
