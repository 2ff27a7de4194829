//! In-memory remote store for service tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{RemoteError, RemoteStore};
use crate::requests::{RequestStatus, ServiceRequest};

#[derive(Default)]
pub struct FakeRemote {
  rows: Mutex<Vec<ServiceRequest>>,
  offline: AtomicBool,
  reads_fail: AtomicBool,
  writes_fail: AtomicBool,
  table_missing: AtomicBool,
  pub write_calls: AtomicUsize,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_rows(rows: Vec<ServiceRequest>) -> Self {
    let fake = Self::new();
    *fake.rows.lock().unwrap() = rows;
    fake
  }

  /// Every call fails with a network error.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn set_reads_fail(&self, fail: bool) {
    self.reads_fail.store(fail, Ordering::SeqCst);
  }

  /// Reads succeed, writes fail.
  pub fn set_writes_fail(&self, fail: bool) {
    self.writes_fail.store(fail, Ordering::SeqCst);
  }

  pub fn set_table_missing(&self, missing: bool) {
    self.table_missing.store(missing, Ordering::SeqCst);
  }

  pub fn rows(&self) -> Vec<ServiceRequest> {
    self.rows.lock().unwrap().clone()
  }

  fn check(&self) -> Result<(), RemoteError> {
    if self.table_missing.load(Ordering::SeqCst) {
      return Err(RemoteError::TableMissing {
        table: "service_requests".into(),
      });
    }
    if self.offline.load(Ordering::SeqCst) {
      return Err(RemoteError::Network("connection refused".into()));
    }
    Ok(())
  }

  fn check_read(&self) -> Result<(), RemoteError> {
    self.check()?;
    if self.reads_fail.load(Ordering::SeqCst) {
      return Err(RemoteError::Network("read timed out".into()));
    }
    Ok(())
  }

  fn check_write(&self) -> Result<(), RemoteError> {
    self.write_calls.fetch_add(1, Ordering::SeqCst);
    self.check()?;
    if self.writes_fail.load(Ordering::SeqCst) {
      return Err(RemoteError::Unknown("HTTP 500: write rejected".into()));
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteStore for FakeRemote {
  async fn list_all(&self) -> Result<Vec<ServiceRequest>, RemoteError> {
    self.check_read()?;
    let mut rows = self.rows();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
  }

  async fn list_by_access_code(&self, code: &str) -> Result<Vec<ServiceRequest>, RemoteError> {
    Ok(
      self
        .list_all()
        .await?
        .into_iter()
        .filter(|r| r.client_access_code.as_deref() == Some(code))
        .collect(),
    )
  }

  async fn insert(&self, record: &ServiceRequest) -> Result<(), RemoteError> {
    self.check_write()?;
    let mut rows = self.rows.lock().unwrap();
    if rows.iter().any(|r| r.id == record.id) {
      return Err(RemoteError::Unknown("HTTP 409: duplicate key".into()));
    }
    rows.push(record.clone());
    Ok(())
  }

  async fn update(&self, record: &ServiceRequest) -> Result<(), RemoteError> {
    self.check_write()?;
    let mut rows = self.rows.lock().unwrap();
    if let Some(row) = rows.iter_mut().find(|r| r.id == record.id) {
      *row = record.clone();
    }
    Ok(())
  }

  async fn upsert(&self, record: &ServiceRequest) -> Result<(), RemoteError> {
    self.check_write()?;
    let mut rows = self.rows.lock().unwrap();
    match rows.iter_mut().find(|r| r.id == record.id) {
      Some(row) => *row = record.clone(),
      None => rows.push(record.clone()),
    }
    Ok(())
  }

  async fn set_status(&self, id: &str, status: RequestStatus) -> Result<(), RemoteError> {
    self.check_write()?;
    let mut rows = self.rows.lock().unwrap();
    if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
      row.status = status;
    }
    Ok(())
  }

  async fn delete(&self, id: &str) -> Result<(), RemoteError> {
    self.check_write()?;
    self.rows.lock().unwrap().retain(|r| r.id != id);
    Ok(())
  }

  async fn probe(&self) -> Result<(), RemoteError> {
    self.check_read()
  }
}
