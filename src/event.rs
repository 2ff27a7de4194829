use tokio::sync::broadcast;

/// Local data changed; listeners should reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changed;

/// Fan-out of change signals to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
  tx: broadcast::Sender<Changed>,
}

impl ChangeNotifier {
  pub fn new() -> Self {
    // Signals carry no payload, so a lagging receiver only needs one
    let (tx, _rx) = broadcast::channel(16);
    Self { tx }
  }

  /// Subscribe to future change signals.
  pub fn subscribe(&self) -> broadcast::Receiver<Changed> {
    self.tx.subscribe()
  }

  /// Emit a change signal. Having no subscribers is fine.
  pub fn notify(&self) {
    let _ = self.tx.send(Changed);
  }
}

impl Default for ChangeNotifier {
  fn default() -> Self {
    Self::new()
  }
}
