use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a supervised worker service.
///
/// The serialized names are the ones observers already consume
/// (`"notInstalled"`, `"running"`, ...).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
    UninitializedStatus,
    NotInstalled,
    NotYetStarted,
    Installing,
    InstallationFailed,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ServiceStatus {
    /// States in which the supervisor owns a live process handle.
    pub fn holds_process(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Starting | ServiceStatus::Running | ServiceStatus::Stopping
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::UninitializedStatus => "uninitializedStatus",
            ServiceStatus::NotInstalled => "notInstalled",
            ServiceStatus::NotYetStarted => "notYetStarted",
            ServiceStatus::Installing => "installing",
            ServiceStatus::InstallationFailed => "installationFailed",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Public snapshot of one service, pushed to observers on every transition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service_name: String,
    pub status: ServiceStatus,
    pub base_url: String,
    pub port: u16,
    pub is_set_up: bool,
    pub is_required: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SetupStatus {
    Executing,
    Success,
    Failed,
}

/// One record of the provisioning progress log.
///
/// A progress sequence always ends with exactly one record whose status is
/// [`SetupStatus::Success`] or [`SetupStatus::Failed`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetupProgress {
    pub service_name: String,
    pub step: String,
    pub status: SetupStatus,
    pub debug_message: String,
}

impl SetupProgress {
    pub fn executing(
        service_name: impl Into<String>,
        step: impl Into<String>,
        debug_message: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            step: step.into(),
            status: SetupStatus::Executing,
            debug_message: debug_message.into(),
        }
    }

    pub fn success(service_name: impl Into<String>, debug_message: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            step: "end".to_string(),
            status: SetupStatus::Success,
            debug_message: debug_message.into(),
        }
    }

    pub fn failed(service_name: impl Into<String>, debug_message: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            step: "end".to_string(),
            status: SetupStatus::Failed,
            debug_message: debug_message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SetupStatus::Executing
    }
}
