use super::logs::{classify_stderr, classify_stdout, forward_lines, worker_target};
use super::models::command::LaunchCommand;
use super::models::handle::{EarlyExitSignal, ProcessHandle};
use crate::error::{Result, SupervisorError};
use log::{error, info};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::oneshot;

/// Spawns a worker and returns immediately, without waiting for readiness.
///
/// The exit watcher is installed before this returns, so an exit right after
/// spawn is never missed. Stdout/stderr are forwarded to the log.
pub fn spawn(command: &LaunchCommand) -> Result<ProcessHandle> {
    info!(
        "Launcher: Spawning [{}]: {:?} {:?} in {:?}",
        command.name(),
        command.executable(),
        command.args(),
        command.work_dir()
    );

    let mut child = Command::new(command.executable())
        .args(command.args())
        .current_dir(command.work_dir())
        .envs(command.env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            error!("Launcher: Failed to spawn [{}]: {}", command.name(), e);
            SupervisorError::Launch {
                executable: command.executable().clone(),
                source: e,
            }
        })?;

    let pid = child.id();
    info!("Launcher: [{}] started (PID: {:?})", command.name(), pid);

    let target = worker_target(command.name());
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, target.clone(), classify_stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, target, classify_stderr);
    }

    let (notifier, exit) = EarlyExitSignal::channel();
    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    let name = command.name().to_string();

    tokio::spawn(async move {
        // A dropped handle counts as a kill request.
        let (status, requested) = tokio::select! {
            status = child.wait() => (status, false),
            _ = kill_rx => {
                if let Err(e) = child.start_kill() {
                    error!("Launcher: Failed to kill [{}]: {}", name, e);
                }
                (child.wait().await, true)
            }
        };
        let reason = match status {
            Ok(status) => status.to_string(),
            Err(e) => format!("wait failed: {}", e),
        };
        if requested {
            info!("Launcher: [{}] terminated on request ({})", name, reason);
        } else {
            error!("Launcher: [{}] exited unexpectedly ({})", name, reason);
        }
        notifier.notify(reason);
    });

    Ok(ProcessHandle::new(pid, kill_tx, exit))
}
