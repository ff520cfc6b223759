use crate::error::Result;
use crate::process::{EarlyExitSignal, LaunchCommand, ProcessHandle};
use async_trait::async_trait;

/// The part of the supervisor that touches the operating system.
///
/// [`super::LocalRuntime`] spawns real processes and polls real endpoints;
/// tests substitute a runtime that only records what it was asked to do.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Spawns the worker. Returns as soon as the process exists, with its
    /// exit watcher already installed.
    async fn spawn(&self, command: LaunchCommand) -> Result<ProcessHandle>;

    /// Waits until `health_url` answers 200 (`true`), the readiness ceiling
    /// is exceeded (`false`) or `early_exit` fires (`false`).
    async fn wait_until_ready(&self, health_url: &str, early_exit: &EarlyExitSignal) -> bool;
}
