use super::command::run_command;
use crate::device::DeviceSelector;
use crate::error::{Result, SupervisorError};
use crate::worker_spec::{ExtraPackage, InstallerOptions, WorkerSpec};
use fs_extra::dir::CopyOptions;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The provisioning steps, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    PrepareWorkDirectory,
    DetectDevice,
    InstallPackageManager,
    InstallDependencies,
    MoveToTarget,
}

impl SetupStep {
    /// Step name as it appears in progress records.
    pub fn label(&self) -> &'static str {
        match self {
            SetupStep::PrepareWorkDirectory => "preparing work directory",
            SetupStep::DetectDevice => "Detecting intel device",
            SetupStep::InstallPackageManager => "install package manager",
            SetupStep::InstallDependencies => "install dependencies",
            SetupStep::MoveToTarget => "move python environment to target",
        }
    }

    /// Steps a worker needs. Device detection only when it asks for a device.
    pub fn plan(spec: &WorkerSpec) -> Vec<SetupStep> {
        let mut steps = vec![SetupStep::PrepareWorkDirectory];
        if spec.device_selection.is_some() {
            steps.push(SetupStep::DetectDevice);
        }
        steps.extend([
            SetupStep::InstallPackageManager,
            SetupStep::InstallDependencies,
            SetupStep::MoveToTarget,
        ]);
        steps
    }
}

/// State threaded through one pipeline run.
pub struct PipelineContext {
    pub spec: Arc<WorkerSpec>,
    pub prototype_env: PathBuf,
    pub devices: Arc<DeviceSelector>,
    pub scratch: PathBuf,
    /// Architecture tag once device detection ran (or was memoized).
    pub arch: Option<String>,
}

impl PipelineContext {
    pub fn new(spec: Arc<WorkerSpec>, prototype_env: PathBuf, devices: Arc<DeviceSelector>) -> Self {
        let scratch = spec.scratch_dir();
        Self {
            spec,
            prototype_env,
            devices,
            scratch,
            arch: None,
        }
    }

    pub fn announcement(&self, step: SetupStep) -> String {
        match step {
            SetupStep::PrepareWorkDirectory => "Cloning archetype python env".to_string(),
            SetupStep::DetectDevice => "Trying to identify intel hardware".to_string(),
            SetupStep::InstallPackageManager => "Installing package manager".to_string(),
            SetupStep::InstallDependencies => "installing dependencies".to_string(),
            SetupStep::MoveToTarget => format!(
                "Moving python environment to target place at {}",
                self.spec.env_dir.display()
            ),
        }
    }

    /// Runs `step`. On success returns the completion message.
    pub async fn run(&mut self, step: SetupStep) -> Result<String> {
        let outcome = match step {
            SetupStep::PrepareWorkDirectory => self.prepare_work_directory().await,
            SetupStep::DetectDevice => self.detect_device().await,
            SetupStep::InstallPackageManager => self.install_package_manager().await,
            SetupStep::InstallDependencies => self.install_dependencies().await,
            SetupStep::MoveToTarget => self.move_to_target().await,
        };
        outcome.map_err(|e| e.in_step(step.label()))
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn interpreter(&self) -> Result<PathBuf> {
        existing(self.spec.interpreter_in(&self.scratch))
    }

    async fn prepare_work_directory(&mut self) -> Result<String> {
        let prototype = existing(self.prototype_env.clone())?;
        let scratch = self.scratch.clone();
        info!(
            "Provisioner: [{}] Cloning archetype python env {:?} into {:?}",
            self.name(),
            prototype,
            scratch
        );
        let name = self.name().to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if scratch.exists() {
                info!(
                    "Provisioner: [{}] Cleaning up previous containment directory at {:?}",
                    name, scratch
                );
                std::fs::remove_dir_all(&scratch)?;
            }
            std::fs::create_dir_all(&scratch)?;
            let options = CopyOptions {
                overwrite: true,
                content_only: true,
                ..CopyOptions::new()
            };
            fs_extra::dir::copy(&prototype, &scratch, &options)?;
            Ok(())
        })
        .await
        .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))??;
        Ok("Cloning complete".to_string())
    }

    async fn detect_device(&mut self) -> Result<String> {
        let Some(selection) = self.spec.device_selection.clone() else {
            return Ok("no device selection required".to_string());
        };

        if self.devices.selected().is_none() {
            let helper_source = existing(selection.helper_source.clone())?;
            let helper = selection.helper_path(&self.scratch);
            info!(
                "Provisioner: [{}] Copying discovery helper to {:?}",
                self.name(),
                helper
            );
            if let Some(parent) = helper.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&helper_source, &helper).await?;

            if let Some(requirements) = &selection.helper_requirements {
                let requirements = existing(requirements.clone())?;
                let python = self.interpreter()?;
                let args = requirements_args(&self.spec.installer, &requirements);
                run_command(self.name(), &python, &args).await?;
            }

            self.devices.ensure_selected(&helper).await?;
        }

        let selected = self
            .devices
            .selected()
            .ok_or(SupervisorError::NoSupportedDevice(0))?;
        let tag = selected.arch.tag.clone();
        self.arch = Some(tag.clone());
        Ok(format!(
            "detected intel hardware {} ({}, {})",
            selected.device.id, selected.device.name, tag
        ))
    }

    async fn install_package_manager(&mut self) -> Result<String> {
        let python = self.interpreter()?;
        let bootstrap = existing(self.scratch.join(&self.spec.installer.bootstrap_script))?;
        info!(
            "Provisioner: [{}] installing package manager into env {:?}",
            self.name(),
            self.scratch
        );
        run_command(
            self.name(),
            &python,
            &[bootstrap.to_string_lossy().to_string()],
        )
        .await?;

        if self.spec.installer.fast_installer {
            run_command(self.name(), &python, &strings(&["-m", "pip", "install", "uv"])).await?;
            return Ok("pip and uv installed".to_string());
        }
        Ok("pip installed".to_string())
    }

    async fn install_dependencies(&mut self) -> Result<String> {
        let python = self.interpreter()?;
        let arch = self.arch.clone();
        let mut installed = 0;

        // Architecture specific packages go first so the manifest cannot pull generic builds.
        for package in &self.spec.extra_packages {
            if !package.applies_to(arch.as_deref()) {
                continue;
            }
            info!(
                "Provisioner: [{}] Installing dependency {}",
                self.name(),
                package.spec
            );
            run_command(
                self.name(),
                &python,
                &package_args(&self.spec.installer, package),
            )
            .await?;
            installed += 1;
        }

        if let Some(requirements) = &self.spec.requirements {
            if !requirements.exists() && self.spec.skip_missing_requirements {
                info!(
                    "Provisioner: [{}] No requirements file at {:?} - skipping",
                    self.name(),
                    requirements
                );
            } else {
                let requirements = existing(requirements.clone())?;
                run_command(
                    self.name(),
                    &python,
                    &requirements_args(&self.spec.installer, &requirements),
                )
                .await?;
            }
        }

        info!(
            "Provisioner: [{}] {} extra packages installed",
            self.name(),
            installed
        );
        Ok("dependencies installed".to_string())
    }

    async fn move_to_target(&mut self) -> Result<String> {
        let scratch = self.scratch.clone();
        let target = self.spec.env_dir.clone();
        let name = self.name().to_string();
        info!(
            "Provisioner: [{}] renaming directory {:?} to {:?}",
            name, scratch, target
        );
        tokio::task::spawn_blocking(move || -> Result<()> {
            if target.exists() {
                info!(
                    "Provisioner: [{}] Cleaning up previous resource directory at {:?}",
                    name, target
                );
                std::fs::remove_dir_all(&target)?;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if std::fs::rename(&scratch, &target).is_err() {
                // rename cannot cross filesystems
                std::fs::create_dir_all(&target)?;
                let options = CopyOptions {
                    content_only: true,
                    ..CopyOptions::new()
                };
                fs_extra::dir::move_dir(&scratch, &target, &options)?;
                if scratch.exists() {
                    std::fs::remove_dir_all(&scratch)?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))??;
        Ok(format!("Moved to {}", self.spec.env_dir.display()))
    }
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(SupervisorError::MissingPath(path))
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Interpreter arguments that install a requirements manifest.
pub fn requirements_args(installer: &InstallerOptions, requirements: &Path) -> Vec<String> {
    let requirements = requirements.to_string_lossy().to_string();
    if !installer.fast_installer {
        return vec![
            "-m".into(),
            "pip".into(),
            "install".into(),
            "-r".into(),
            requirements,
        ];
    }
    let mut args = strings(&["-m", "uv", "pip", "install", "-r"]);
    args.push(requirements);
    if let Some(strategy) = &installer.index_strategy {
        args.push("--index-strategy".into());
        args.push(strategy.clone());
    }
    args
}

/// Interpreter arguments that install a single extra package.
pub fn package_args(installer: &InstallerOptions, package: &ExtraPackage) -> Vec<String> {
    let mut args = if installer.fast_installer {
        strings(&["-m", "uv", "pip", "install"])
    } else {
        strings(&["-m", "pip", "install"])
    };
    args.push(package.spec.clone());
    if let Some(index) = &package.extra_index_url {
        args.push("--extra-index-url".into());
        args.push(index.clone());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_args_fast_and_slow() {
        let fast = InstallerOptions::default();
        assert_eq!(
            requirements_args(&fast, Path::new("req.txt")),
            vec![
                "-m",
                "uv",
                "pip",
                "install",
                "-r",
                "req.txt",
                "--index-strategy",
                "unsafe-best-match"
            ]
        );

        let slow = InstallerOptions {
            fast_installer: false,
            ..InstallerOptions::default()
        };
        assert_eq!(
            requirements_args(&slow, Path::new("req.txt")),
            vec!["-m", "pip", "install", "-r", "req.txt"]
        );
    }

    #[test]
    fn test_package_args_with_extra_index() {
        let package = ExtraPackage {
            spec: "intel-extension-for-pytorch==2.3.110.post0+xpu".into(),
            extra_index_url: Some("https://example.invalid/xpu/".into()),
            architectures: vec![],
        };
        let slow = InstallerOptions {
            fast_installer: false,
            ..InstallerOptions::default()
        };
        assert_eq!(
            package_args(&slow, &package),
            vec![
                "-m",
                "pip",
                "install",
                "intel-extension-for-pytorch==2.3.110.post0+xpu",
                "--extra-index-url",
                "https://example.invalid/xpu/"
            ]
        );
    }
}
