//! Fire-and-forget delivery of case events.

use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::CaseEvent;

/// Receives committed case events. Errors are logged by the engine and
/// otherwise ignored.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &CaseEvent) -> Result<()>;
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &CaseEvent) -> Result<()> {
        Ok(())
    }
}

/// Fans events out to in-process subscribers (mailers, dashboards).
///
/// Slow subscribers lag and lose the oldest events; senders never block.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<CaseEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaseEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: &CaseEvent) -> Result<()> {
        // No subscribers is not a delivery failure.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
