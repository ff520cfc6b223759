use crate::device::ArchEntry;
use crate::error::{Result, SupervisorError};
use crate::worker_spec::{
    DeviceSelectionSpec, EnvVar, ExtraPackage, InstallerOptions, WorkerSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SUPERVISOR";
pub const DEFAULT_CONFIG_FILE: &str = "supervisor.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub bind_address: String,
    /// Relative paths below are resolved against this directory.
    pub base_dir: PathBuf,
    /// Prototypical python environment cloned by every provisioning run.
    pub prototype_env_dir: PathBuf,
    /// Start every installed required service at boot.
    pub autostart: bool,
    pub stop_grace_ms: u64,
    pub health_timeout_ms: u64,
    pub health_interval_ms: u64,
    /// Merged over the built-in architecture table.
    pub architectures: Vec<ArchEntry>,
    pub services: Vec<WorkerSpec>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:59000".to_string(),
            base_dir: PathBuf::from("."),
            prototype_env_dir: PathBuf::from("prototype-python-env"),
            autostart: true,
            stop_grace_ms: 1000,
            health_timeout_ms: 120_000,
            health_interval_ms: 250,
            architectures: Vec::new(),
            services: vec![llama_cpp_backend()],
        }
    }
}

/// The stock llama.cpp worker.
fn llama_cpp_backend() -> WorkerSpec {
    let (python, helper_in_env, helper_source) = if cfg!(windows) {
        (
            "python.exe",
            "Library/bin/ls_level_zero.exe",
            "service/tools/ls_level_zero.exe",
        )
    } else {
        ("bin/python3", "bin/ls_level_zero", "service/tools/ls_level_zero")
    };

    let env = vec![
        EnvVar::new("SYCL_ENABLE_DEFAULT_CONTEXTS", "1"),
        EnvVar::new("SYCL_CACHE_PERSISTENT", "1"),
        EnvVar::new("PYTHONIOENCODING", "utf-8"),
    ];

    WorkerSpec {
        name: "llamacpp-backend".to_string(),
        port: 39100,
        is_required: false,
        service_dir: PathBuf::from("LlamaCPP"),
        env_dir: PathBuf::from("llama-cpp-env"),
        interpreter: PathBuf::from(python),
        args: vec![
            "llama_web_api.py".to_string(),
            "--port".to_string(),
            "{port}".to_string(),
        ],
        health_path: "/health".to_string(),
        requirements: Some(PathBuf::from("LlamaCPP/requirements.txt")),
        skip_missing_requirements: false,
        extra_packages: vec![ExtraPackage {
            spec: "llama-cpp-python==0.3.2".to_string(),
            extra_index_url: None,
            architectures: Vec::new(),
        }],
        installer: InstallerOptions::default(),
        env,
        device_selection: Some(DeviceSelectionSpec {
            helper_source: PathBuf::from(helper_source),
            helper_in_env: PathBuf::from(helper_in_env),
            helper_requirements: Some(PathBuf::from("service/requirements-ls_level_zero.txt")),
        }),
    }
}

impl SupervisorConfig {
    /// Defaults, then the TOML file, then `SUPERVISOR__*` environment variables.
    ///
    /// An explicit `path` must exist; without one `supervisor.toml` is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: SupervisorConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.resolved()
    }

    /// Makes every relative path absolute against `base_dir` and validates the result.
    pub fn resolved(mut self) -> Result<Self> {
        let base = self.base_dir.clone();
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.prototype_env_dir);
        for spec in &mut self.services {
            resolve(&mut spec.service_dir);
            resolve(&mut spec.env_dir);
            if let Some(requirements) = spec.requirements.as_mut() {
                resolve(requirements);
            }
            if let Some(selection) = spec.device_selection.as_mut() {
                resolve(&mut selection.helper_source);
                if let Some(requirements) = selection.helper_requirements.as_mut() {
                    resolve(requirements);
                }
            }
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for spec in &self.services {
            if !names.insert(spec.name.as_str()) {
                return Err(SupervisorError::Config(format!(
                    "duplicate service name '{}'",
                    spec.name
                )));
            }
            if !ports.insert(spec.port) {
                return Err(SupervisorError::Config(format!(
                    "service '{}' reuses port {}",
                    spec.name, spec.port
                )));
            }
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}
