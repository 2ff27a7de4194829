//! Outbox draining: retries remote writes until they are acknowledged.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::RequestService;
use crate::cache::SyncKind;
use crate::remote::RemoteError;

/// Outcome of one pass over the outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Writes the remote acknowledged
  pub pushed: usize,
  /// Writes that failed again and stay queued
  pub failed: usize,
  /// Markers whose record no longer exists locally
  pub dropped: usize,
  /// Last remote error seen during the pass
  pub last_error: Option<RemoteError>,
}

impl SyncReport {
  pub fn is_empty(&self) -> bool {
    self.pushed == 0 && self.failed == 0 && self.dropped == 0
  }
}

impl RequestService {
  /// Push every pending write to the remote once.
  pub async fn sync(&self) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for marker in self.local.pending()? {
      let outcome = match marker.kind {
        SyncKind::Upsert => match self.local.get(&marker.id)? {
          Some(record) => self.remote.upsert(&record).await,
          None => {
            self.local.acknowledge(&marker)?;
            report.dropped += 1;
            continue;
          }
        },
        SyncKind::Delete => self.remote.delete(&marker.id).await,
      };

      match outcome {
        Ok(()) => {
          self.local.acknowledge(&marker)?;
          report.pushed += 1;
          debug!(id = %marker.id, kind = %marker.kind, "Pending write synced");
        }
        Err(e) => {
          self.local.record_attempt(&marker.id)?;
          report.failed += 1;
          warn!(
            id = %marker.id,
            kind = %marker.kind,
            attempts = marker.attempts + 1,
            error = %e,
            "Pending write still failing"
          );
          report.last_error = Some(e);
        }
      }
    }

    Ok(report)
  }
}

/// Background loop that drains the outbox on a fixed interval and right
/// after every local change made through this process's service. Writes
/// queued by other processes wait for the next tick.
pub struct Reconciler {
  service: Arc<RequestService>,
  interval: Duration,
}

impl Reconciler {
  pub fn new(service: Arc<RequestService>, interval: Duration) -> Self {
    Self { service, interval }
  }

  /// Run until `shutdown` completes.
  pub async fn run<F>(self, shutdown: F) -> Result<()>
  where
    F: Future<Output = ()>,
  {
    let mut changes = self.service.subscribe();
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(interval_secs = self.interval.as_secs(), "Reconciler started");

    loop {
      tokio::select! {
        _ = &mut shutdown => break,
        _ = ticker.tick() => {}
        changed = changes.recv() => match changed {
          Ok(_) | Err(RecvError::Lagged(_)) => {}
          Err(RecvError::Closed) => break,
        },
      }

      match self.service.sync().await {
        Ok(report) if !report.is_empty() => info!(
          pushed = report.pushed,
          failed = report.failed,
          dropped = report.dropped,
          "Sync pass finished"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Sync pass failed"),
      }
    }

    info!("Reconciler stopped");
    Ok(())
  }
}
