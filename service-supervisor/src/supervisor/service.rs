use super::state::ServiceState;
use crate::error::{Result, SupervisorError};
use crate::event_bus::{EventBus, SupervisorEvent};
use crate::process::{EarlyExitSignal, LaunchCommand};
use crate::provision::Provisioner;
use crate::runtime::WorkerRuntime;
use crate::worker_spec::WorkerSpec;
use futures::stream::{BoxStream, StreamExt};
use log::{debug, error, info, warn};
use service_protocol::{ServiceInfo, ServiceStatus, SetupProgress, SetupStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(1000);

/// Owns the lifecycle of one worker: provisioning, start, stop and crash
/// detection.
///
/// Every status assignment publishes a [`SupervisorEvent::ServiceInfoUpdated`]
/// snapshot. The state lock is never held across an await.
pub struct ServiceSupervisor<R: WorkerRuntime> {
    spec: Arc<WorkerSpec>,
    runtime: Arc<R>,
    provisioner: Provisioner,
    event_bus: EventBus,
    stop_grace: Duration,
    state: Arc<Mutex<ServiceState>>,
}

impl<R: WorkerRuntime> Clone for ServiceSupervisor<R> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            runtime: self.runtime.clone(),
            provisioner: self.provisioner.clone(),
            event_bus: self.event_bus.clone(),
            stop_grace: self.stop_grace,
            state: self.state.clone(),
        }
    }
}

impl<R: WorkerRuntime + 'static> ServiceSupervisor<R> {
    pub fn new(
        spec: WorkerSpec,
        runtime: Arc<R>,
        provisioner: Provisioner,
        event_bus: EventBus,
    ) -> Self {
        Self {
            spec: Arc::new(spec),
            runtime,
            provisioner,
            event_bus,
            stop_grace: DEFAULT_STOP_GRACE,
            state: Arc::new(Mutex::new(ServiceState::new())),
        }
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    /// Current status as stored, without resolving the initial state.
    pub fn status(&self) -> ServiceStatus {
        self.lock().current
    }

    pub fn desired_status(&self) -> ServiceStatus {
        self.lock().desired
    }

    /// Public snapshot. The first call resolves `uninitializedStatus` from disk.
    pub fn info(&self) -> ServiceInfo {
        let mut state = self.lock();
        if state.current == ServiceStatus::UninitializedStatus {
            let resolved = if self.spec.is_set_up() {
                ServiceStatus::NotYetStarted
            } else {
                ServiceStatus::NotInstalled
            };
            self.set_status(&mut state, resolved);
        }
        self.snapshot(state.current)
    }

    /// Launches the worker and waits for readiness.
    ///
    /// A readiness timeout or an early exit yields `Ok(Failed)`; spawn and
    /// device selection errors are returned after the service was marked failed.
    pub async fn start(&self) -> Result<ServiceStatus> {
        let generation = {
            let mut state = self.lock();
            if state.desired == ServiceStatus::Stopped && state.current != ServiceStatus::Stopped {
                return Err(SupervisorError::conflict(
                    "Server currently stopping. Cannot start it.",
                ));
            }
            if state.current == ServiceStatus::Running {
                return Ok(ServiceStatus::Running);
            }
            if state.desired == ServiceStatus::Running {
                return Err(SupervisorError::conflict("Server startup already requested"));
            }
            if state.installing {
                return Err(SupervisorError::conflict(
                    "Server is being set up. Cannot start it.",
                ));
            }
            info!("Supervisor: [{}] starting service", self.name());
            state.desired = ServiceStatus::Running;
            state.generation += 1;
            self.set_status(&mut state, ServiceStatus::Starting);
            state.generation
        };

        let outcome = self.launch(generation).await;

        let mut state = self.lock();
        if !state.is_current_launch(generation) {
            // A stop took over; it owns the remaining transitions.
            debug!(
                "Supervisor: [{}] start superseded while {}",
                self.name(),
                state.current
            );
            return Ok(state.current);
        }

        match outcome {
            Ok(true) => {
                info!(
                    "Supervisor: [{}] service ready at {}",
                    self.name(),
                    self.spec.base_url()
                );
                self.set_status(&mut state, ServiceStatus::Running);
                let exit = state.process.as_ref().map(|p| p.exit_signal());
                drop(state);
                if let Some(exit) = exit {
                    self.watch_for_crash(generation, exit);
                }
                Ok(ServiceStatus::Running)
            }
            Ok(false) => {
                warn!(
                    "Supervisor: [{}] server process did not become ready",
                    self.name()
                );
                self.fail(&mut state);
                Ok(ServiceStatus::Failed)
            }
            Err(e) => {
                error!("Supervisor: [{}] failed to start: {}", self.name(), e);
                self.fail(&mut state);
                drop(state);
                self.event_bus.publish(SupervisorEvent::Error {
                    error: format!("[{}] failed to start: {}", self.name(), e),
                });
                Err(e)
            }
        }
    }

    /// Kills the worker and waits the grace period. Accepted in every state.
    ///
    /// Returns the status after the grace period: `stopped`, unless a later
    /// request or a settling provisioning run moved the service on. A running
    /// provisioning pipeline is not interrupted; its outcome still settles the
    /// status once it ends.
    pub async fn stop(&self) -> ServiceStatus {
        {
            let mut state = self.lock();
            state.desired = ServiceStatus::Stopped;
            if state.current == ServiceStatus::Stopping {
                debug!("Supervisor: [{}] stop already in progress", self.name());
            } else {
                info!("Supervisor: [{}] stopping service", self.name());
                if state.installing {
                    warn!(
                        "Supervisor: [{}] environment setup keeps running until it ends",
                        self.name()
                    );
                }
                self.set_status(&mut state, ServiceStatus::Stopping);
            }
            if let Some(process) = state.process.as_mut() {
                process.kill();
            }
        }

        tokio::time::sleep(self.stop_grace).await;

        let mut state = self.lock();
        if state.desired == ServiceStatus::Stopped && state.current == ServiceStatus::Stopping {
            state.process = None;
            self.set_status(&mut state, ServiceStatus::Stopped);
        }
        state.current
    }

    /// Starts provisioning and returns its progress sequence.
    ///
    /// Rejected while the service is installing or owns a process. The
    /// service moves to `installing` immediately; the terminal record decides
    /// between `notYetStarted` and `installationFailed`. Dropping the sequence
    /// early counts as a failure.
    pub fn set_up(&self) -> Result<BoxStream<'static, SetupProgress>> {
        {
            let mut state = self.lock();
            if state.installing || state.current.holds_process() {
                return Err(SupervisorError::conflict(format!(
                    "Cannot set up service while it is {}",
                    state.current
                )));
            }
            state.desired = ServiceStatus::Installing;
            state.installing = true;
            self.set_status(&mut state, ServiceStatus::Installing);
        }

        let mut guard = InstallGuard {
            supervisor: self.clone(),
            finished: false,
        };
        let event_bus = self.event_bus.clone();
        let progress = self
            .provisioner
            .pipeline(self.spec.clone())
            .map(move |progress| {
                event_bus.publish(SupervisorEvent::SetupProgressed {
                    progress: progress.clone(),
                });
                if progress.status == SetupStatus::Failed {
                    event_bus.publish(SupervisorEvent::Error {
                        error: format!("[{}] {}", progress.service_name, progress.debug_message),
                    });
                }
                if progress.is_terminal() {
                    guard.finish(progress.status);
                }
                progress
            });
        Ok(progress.boxed())
    }

    async fn launch(&self, generation: u64) -> Result<bool> {
        let command = self.launch_command().await?;
        let process = self.runtime.spawn(command).await?;
        let exit = process.exit_signal();
        {
            let mut state = self.lock();
            if !state.is_current_launch(generation) {
                // dropping the handle kills the process
                return Ok(false);
            }
            if let Some(pid) = process.pid() {
                debug!("Supervisor: [{}] worker spawned with pid {}", self.name(), pid);
            }
            state.process = Some(process);
        }
        Ok(self
            .runtime
            .wait_until_ready(&self.spec.health_url(), &exit)
            .await)
    }

    async fn launch_command(&self) -> Result<LaunchCommand> {
        let mut env = self.spec.env_overrides();
        if let Some(selection) = &self.spec.device_selection {
            let helper = selection.helper_path(&self.spec.env_dir);
            let selected = self.provisioner.devices().ensure_selected(&helper).await?;
            let (key, value) = selected.selector_env();
            env.insert(key, value);
        }
        Ok(LaunchCommand::new(
            self.spec.name.clone(),
            self.spec.interpreter_path(),
            self.spec.launch_args(),
            self.spec.service_dir.clone(),
            env,
        ))
    }

    fn watch_for_crash(&self, generation: u64, exit: EarlyExitSignal) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let reason = exit.wait().await;
            let mut state = supervisor.lock();
            if !state.is_current_launch(generation) || state.current != ServiceStatus::Running {
                return;
            }
            error!(
                "Supervisor: [{}] worker exited while running ({})",
                supervisor.name(),
                reason
            );
            state.desired = ServiceStatus::Failed;
            state.process = None;
            supervisor.set_status(&mut state, ServiceStatus::Failed);
            drop(state);
            supervisor.event_bus.publish(SupervisorEvent::ServiceCrashed {
                name: supervisor.spec.name.clone(),
                exit: reason,
            });
        });
    }

    fn fail(&self, state: &mut ServiceState) {
        state.desired = ServiceStatus::Failed;
        if let Some(mut process) = state.process.take() {
            process.kill();
        }
        self.set_status(state, ServiceStatus::Failed);
    }

    /// Settles a provisioning run, also when a stop arrived while it ran.
    fn finish_setup(&self, outcome: SetupStatus) {
        let mut state = self.lock();
        if !state.installing {
            return;
        }
        state.installing = false;
        let status = match outcome {
            SetupStatus::Success => ServiceStatus::NotYetStarted,
            _ => ServiceStatus::InstallationFailed,
        };
        state.desired = status;
        self.set_status(&mut state, status);
    }

    fn set_status(&self, state: &mut ServiceState, status: ServiceStatus) {
        state.current = status;
        debug!("Supervisor: [{}] status -> {}", self.name(), status);
        self.event_bus.publish(SupervisorEvent::ServiceInfoUpdated {
            info: self.snapshot(status),
        });
    }

    fn snapshot(&self, status: ServiceStatus) -> ServiceInfo {
        ServiceInfo {
            service_name: self.spec.name.clone(),
            status,
            base_url: self.spec.base_url(),
            port: self.spec.port,
            is_set_up: self.spec.is_set_up(),
            is_required: self.spec.is_required,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles the `installing` status when a progress sequence ends or is dropped.
struct InstallGuard<R: WorkerRuntime + 'static> {
    supervisor: ServiceSupervisor<R>,
    finished: bool,
}

impl<R: WorkerRuntime + 'static> InstallGuard<R> {
    fn finish(&mut self, outcome: SetupStatus) {
        self.finished = true;
        self.supervisor.finish_setup(outcome);
    }
}

impl<R: WorkerRuntime + 'static> Drop for InstallGuard<R> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Supervisor: [{}] setup progress abandoned before completion",
                self.supervisor.name()
            );
            self.supervisor.finish_setup(SetupStatus::Failed);
        }
    }
}
