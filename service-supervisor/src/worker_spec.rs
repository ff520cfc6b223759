//! Static description of one supervised worker.
//!
//! A [`WorkerSpec`] carries everything that differs between worker types:
//! paths, port, health endpoint, dependency lists and whether the worker needs
//! a compute device selected for it. The supervisor and provisioner are
//! generic over it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    /// Unique key of the service.
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub is_required: bool,

    /// Working directory of the worker process.
    pub service_dir: PathBuf,
    /// Permanent location of the provisioned environment.
    pub env_dir: PathBuf,
    /// Entry point inside `env_dir`. Its presence on disk means "set up".
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,
    /// Worker arguments. The literal `{port}` is replaced by `port`.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Base dependency manifest, installed with `-r`.
    #[serde(default)]
    pub requirements: Option<PathBuf>,
    #[serde(default)]
    pub skip_missing_requirements: bool,
    #[serde(default)]
    pub extra_packages: Vec<ExtraPackage>,
    #[serde(default)]
    pub installer: InstallerOptions,

    /// Static environment overrides for the worker process.
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub device_selection: Option<DeviceSelectionSpec>,
}

/// One environment override. A list rather than a map because config file
/// keys are lowercased on load, which would mangle variable names.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An additional package installed before the base manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtraPackage {
    /// Requirement specifier or path to a wheel.
    pub spec: String,
    #[serde(default)]
    pub extra_index_url: Option<String>,
    /// Architectures this package applies to. Empty means all.
    #[serde(default)]
    pub architectures: Vec<String>,
}

impl ExtraPackage {
    pub fn applies_to(&self, arch: Option<&str>) -> bool {
        if self.architectures.is_empty() {
            return true;
        }
        match arch {
            Some(arch) => self.architectures.iter().any(|a| a == arch),
            None => false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstallerOptions {
    /// Script inside the environment that bootstraps `pip`.
    #[serde(default = "default_bootstrap_script")]
    pub bootstrap_script: PathBuf,
    /// Install and use `uv` for dependency resolution. When off, plain `pip` is used.
    #[serde(default = "default_true")]
    pub fast_installer: bool,
    /// Passed to `uv pip install --index-strategy`.
    #[serde(default = "default_index_strategy")]
    pub index_strategy: Option<String>,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            bootstrap_script: default_bootstrap_script(),
            fast_installer: true,
            index_strategy: default_index_strategy(),
        }
    }
}

/// Where the device discovery helper comes from and where it lives once installed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceSelectionSpec {
    pub helper_source: PathBuf,
    /// Helper location relative to the environment directory.
    pub helper_in_env: PathBuf,
    #[serde(default)]
    pub helper_requirements: Option<PathBuf>,
}

impl DeviceSelectionSpec {
    pub fn helper_path(&self, env_dir: &Path) -> PathBuf {
        env_dir.join(&self.helper_in_env)
    }
}

impl WorkerSpec {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), self.health_path)
    }

    /// Interpreter inside an arbitrary environment directory (scratch or permanent).
    pub fn interpreter_in(&self, env_dir: &Path) -> PathBuf {
        env_dir.join(&self.interpreter)
    }

    pub fn interpreter_path(&self) -> PathBuf {
        self.interpreter_in(&self.env_dir)
    }

    /// Scratch directory the environment is assembled in before relocation.
    pub fn scratch_dir(&self) -> PathBuf {
        self.env_dir.with_file_name(format!("{}-env_tmp", self.name))
    }

    /// Recomputed from disk every time; never cached.
    pub fn is_set_up(&self) -> bool {
        self.interpreter_path().exists()
    }

    /// Static overrides as a map; later entries win.
    pub fn env_overrides(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|var| (var.name.clone(), var.value.clone()))
            .collect()
    }

    pub fn launch_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        self.args.iter().map(|a| a.replace("{port}", &port)).collect()
    }
}

fn default_interpreter() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("python.exe")
    } else {
        PathBuf::from("bin/python3")
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_bootstrap_script() -> PathBuf {
    PathBuf::from("get-pip.py")
}

fn default_index_strategy() -> Option<String> {
    Some("unsafe-best-match".to_string())
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WorkerSpec {
        serde_json::from_value(serde_json::json!({
            "name": "llamacpp-backend",
            "port": 39100,
            "service_dir": "/opt/app/LlamaCPP",
            "env_dir": "/opt/app/llama-cpp-env",
            "args": ["llama_web_api.py", "--port", "{port}"]
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_and_derived_urls() {
        let spec = spec();
        assert_eq!(spec.base_url(), "http://127.0.0.1:39100");
        assert_eq!(spec.health_url(), "http://127.0.0.1:39100/health");
        assert!(!spec.is_required);
        assert!(spec.installer.fast_installer);
        assert_eq!(
            spec.installer.index_strategy.as_deref(),
            Some("unsafe-best-match")
        );
        assert_eq!(spec.launch_args(), vec!["llama_web_api.py", "--port", "39100"]);
    }

    #[test]
    fn test_scratch_dir_is_sibling_of_env_dir() {
        let spec = spec();
        assert_eq!(
            spec.scratch_dir(),
            PathBuf::from("/opt/app/llamacpp-backend-env_tmp")
        );
    }

    #[test]
    fn test_extra_package_architecture_filter() {
        let generic = ExtraPackage {
            spec: "numpy".into(),
            extra_index_url: None,
            architectures: vec![],
        };
        let arc_only = ExtraPackage {
            spec: "ipex".into(),
            extra_index_url: None,
            architectures: vec!["acm".into(), "bmg".into()],
        };
        assert!(generic.applies_to(None));
        assert!(generic.applies_to(Some("mtl")));
        assert!(arc_only.applies_to(Some("bmg")));
        assert!(!arc_only.applies_to(Some("mtl")));
        assert!(!arc_only.applies_to(None));
    }
}
