//! Remote store adapter for the hosted `service_requests` table.

mod client;
mod error;
#[cfg(test)]
pub mod fake;
mod rows;

use async_trait::async_trait;

use crate::requests::{RequestStatus, ServiceRequest};

pub use client::PostgrestStore;
pub use error::RemoteError;

/// CRUD against the remote table, keyed by request id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// All rows, newest first.
  async fn list_all(&self) -> Result<Vec<ServiceRequest>, RemoteError>;

  /// Rows whose access code equals `code` exactly.
  async fn list_by_access_code(&self, code: &str) -> Result<Vec<ServiceRequest>, RemoteError>;

  async fn insert(&self, record: &ServiceRequest) -> Result<(), RemoteError>;

  async fn update(&self, record: &ServiceRequest) -> Result<(), RemoteError>;

  /// Insert, or overwrite the row with the same id.
  async fn upsert(&self, record: &ServiceRequest) -> Result<(), RemoteError>;

  async fn set_status(&self, id: &str, status: RequestStatus) -> Result<(), RemoteError>;

  async fn delete(&self, id: &str) -> Result<(), RemoteError>;

  /// Cheap check that the table exists and is readable.
  async fn probe(&self) -> Result<(), RemoteError>;
}

/// Stand-in used when no remote is configured. Every call fails with a
/// network error, so the service runs on the local cache alone.
pub struct Disconnected;

impl Disconnected {
  fn error() -> RemoteError {
    RemoteError::Network("no remote store configured".to_string())
  }
}

#[async_trait]
impl RemoteStore for Disconnected {
  async fn list_all(&self) -> Result<Vec<ServiceRequest>, RemoteError> {
    Err(Self::error())
  }

  async fn list_by_access_code(&self, _code: &str) -> Result<Vec<ServiceRequest>, RemoteError> {
    Err(Self::error())
  }

  async fn insert(&self, _record: &ServiceRequest) -> Result<(), RemoteError> {
    Err(Self::error())
  }

  async fn update(&self, _record: &ServiceRequest) -> Result<(), RemoteError> {
    Err(Self::error())
  }

  async fn upsert(&self, _record: &ServiceRequest) -> Result<(), RemoteError> {
    Err(Self::error())
  }

  async fn set_status(&self, _id: &str, _status: RequestStatus) -> Result<(), RemoteError> {
    Err(Self::error())
  }

  async fn delete(&self, _id: &str) -> Result<(), RemoteError> {
    Err(Self::error())
  }

  async fn probe(&self) -> Result<(), RemoteError> {
    Err(Self::error())
  }
}
