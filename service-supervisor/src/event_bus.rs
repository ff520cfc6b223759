//! # Event Bus
//!
//! Every observable change of a supervised service goes through here: status
//! snapshots, provisioning progress and crashes. The HTTP layer forwards the
//! snapshots to WebSocket observers; tests subscribe to assert on transitions.

use log::{error, warn};
use service_protocol::{ServiceInfo, SetupProgress};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// **Supervisor**: emitted once per status assignment, carrying the full snapshot.
    ServiceInfoUpdated { info: ServiceInfo },

    /// **Provisioner**: mirrors every record of a setup progress sequence.
    SetupProgressed { progress: SetupProgress },

    /// **Supervisor**: a running worker exited without being asked to.
    ServiceCrashed { name: String, exit: String },

    /// **Supervisor**: a failed provisioning run or a failed launch.
    Error { error: String },
}

/// A wrapper around a tokio broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SupervisorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Slow receivers skip old events (`Lagged`) once `capacity` is exceeded.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    pub fn publish(&self, event: SupervisorEvent) {
        // No subscribers is fine (e.g. during startup)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.sender.subscribe()
    }
}

/// Logs every crash until the bus closes. Returns the number of crashes seen.
///
/// A lagging receiver keeps going; the skipped events are only counted.
pub async fn log_crashes(mut events: broadcast::Receiver<SupervisorEvent>) -> usize {
    let mut crashes = 0;
    loop {
        match events.recv().await {
            Ok(SupervisorEvent::ServiceCrashed { name, exit }) => {
                crashes += 1;
                error!("Service [{}] crashed ({})", name, exit);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("EventBus: crash log lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => return crashes,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
