use std::path::PathBuf;
use thiserror::Error;

/// Every failure the supervisor library can report.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The device discovery helper failed or printed something unusable.
    #[error("device discovery failed: {0}")]
    Discovery(String),

    /// Devices were found but none maps to a known architecture.
    #[error("no supported device found among {0} discovered device(s)")]
    NoSupportedDevice(usize),

    /// A provisioning step failed. Carries the step name and the cause.
    #[error("setup step '{step}' failed: {source}")]
    ProvisioningStep {
        step: String,
        #[source]
        source: Box<SupervisorError>,
    },

    /// A start/stop/setup request clashes with an operation already in flight.
    #[error("{0}")]
    Conflict(String),

    /// The worker process could not be spawned.
    #[error("failed to spawn {executable:?}: {source}")]
    Launch {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess used during provisioning exited unsuccessfully.
    #[error("command {command} exited with {status}")]
    Command { command: String, status: String },

    /// A file the pipeline depends on is missing.
    #[error("required path does not exist: {0:?}")]
    MissingPath(PathBuf),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("filesystem copy error: {0}")]
    Copy(#[from] fs_extra::error::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SupervisorError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Wraps `self` as the cause of a failed provisioning step.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::ProvisioningStep {
            step: step.into(),
            source: Box::new(self),
        }
    }
}

impl From<config::ConfigError> for SupervisorError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// A specialized Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
