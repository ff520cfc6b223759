use crate::error::Result;
use crate::health::HealthMonitor;
use crate::process::{self, EarlyExitSignal, LaunchCommand, ProcessHandle};
use crate::runtime::traits::WorkerRuntime;
use async_trait::async_trait;

/// Runs workers as child processes of this daemon.
#[derive(Debug, Clone, Default)]
pub struct LocalRuntime {
    health: HealthMonitor,
}

impl LocalRuntime {
    pub fn new(health: HealthMonitor) -> Self {
        Self { health }
    }
}

#[async_trait]
impl WorkerRuntime for LocalRuntime {
    async fn spawn(&self, command: LaunchCommand) -> Result<ProcessHandle> {
        process::spawn(&command)
    }

    async fn wait_until_ready(&self, health_url: &str, early_exit: &EarlyExitSignal) -> bool {
        self.health.wait_until_ready(health_url, early_exit).await
    }
}
