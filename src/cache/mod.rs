//! Same-device storage for service requests.
//!
//! This module provides the local half of the offline-first data layer:
//! - Stores every known request so reads still work without the remote
//! - Keeps an outbox of remote writes that failed, one marker per request
//! - Ships an indexed SQLite backend and a whole-list in-memory backend

mod storage;
mod traits;

pub use storage::{MemoryCache, SqliteCache};
pub use traits::{LocalCache, PendingSync, SyncKind};
