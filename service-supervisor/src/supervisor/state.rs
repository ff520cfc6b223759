use crate::process::ProcessHandle;
use service_protocol::ServiceStatus;

/// Mutable part of a supervised service. Only the supervisor writes it.
#[derive(Debug)]
pub struct ServiceState {
    pub current: ServiceStatus,
    /// Last explicitly requested status. Guards against overlapping requests.
    pub desired: ServiceStatus,
    /// Present while a worker process is owned by the supervisor.
    pub process: Option<ProcessHandle>,
    /// A provisioning run is in flight. Outlives `installing` when a stop
    /// arrives before the run settles.
    pub installing: bool,
    /// Bumped by every accepted start, so stale background tasks can tell
    /// they belong to an older launch.
    pub generation: u64,
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            current: ServiceStatus::UninitializedStatus,
            desired: ServiceStatus::UninitializedStatus,
            process: None,
            installing: false,
            generation: 0,
        }
    }

    /// Is `generation` still the launch the service is running for?
    pub fn is_current_launch(&self, generation: u64) -> bool {
        self.generation == generation && self.desired == ServiceStatus::Running
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}
