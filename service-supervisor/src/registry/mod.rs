//! The set of services managed by one daemon.

use crate::config::SupervisorConfig;
use crate::device::{ArchTable, DeviceSelector};
use crate::error::{Result, SupervisorError};
use crate::event_bus::EventBus;
use crate::health::HealthMonitor;
use crate::provision::Provisioner;
use crate::runtime::{LocalRuntime, WorkerRuntime};
use crate::supervisor::ServiceSupervisor;
use futures::future::join_all;
use log::{error, info};
use service_protocol::{ServiceInfo, ServiceStatus};
use std::sync::Arc;

/// Named, ordered collection of supervisors. Services run independently;
/// the registry only fans requests out.
pub struct ServiceRegistry<R: WorkerRuntime> {
    services: Vec<ServiceSupervisor<R>>,
}

impl<R: WorkerRuntime> Clone for ServiceRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
        }
    }
}

impl<R: WorkerRuntime + 'static> ServiceRegistry<R> {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Adds a supervisor. Names must be unique.
    pub fn register(&mut self, supervisor: ServiceSupervisor<R>) -> Result<()> {
        if self.services.iter().any(|s| s.name() == supervisor.name()) {
            return Err(SupervisorError::Config(format!(
                "service '{}' registered twice",
                supervisor.name()
            )));
        }
        info!("Registry: registered service [{}]", supervisor.name());
        self.services.push(supervisor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ServiceSupervisor<R>> {
        self.services
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name().to_string()).collect()
    }

    /// Snapshot of every service, in registration order.
    pub fn list(&self) -> Vec<ServiceInfo> {
        self.services.iter().map(|s| s.info()).collect()
    }

    /// Starts every required service whose environment is installed, concurrently.
    pub async fn start_required(&self) -> Vec<(String, Result<ServiceStatus>)> {
        let candidates: Vec<_> = self
            .services
            .iter()
            .filter(|s| s.spec().is_required && s.spec().is_set_up())
            .collect();
        let results = join_all(candidates.iter().map(|s| s.start())).await;
        candidates
            .iter()
            .zip(results)
            .map(|(s, result)| {
                if let Err(e) = &result {
                    error!("Registry: failed to start [{}]: {}", s.name(), e);
                }
                (s.name().to_string(), result)
            })
            .collect()
    }

    /// Stops every service, concurrently.
    pub async fn stop_all(&self) {
        info!("Registry: stopping {} service(s)", self.services.len());
        join_all(self.services.iter().map(|s| s.stop())).await;
    }
}

impl<R: WorkerRuntime + 'static> Default for ServiceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry<LocalRuntime> {
    /// Builds supervisors for every configured service, sharing one runtime
    /// and one device selection.
    pub fn from_config(config: &SupervisorConfig, event_bus: EventBus) -> Result<Self> {
        let health = HealthMonitor::new(config.health_timeout(), config.health_interval());
        let runtime = Arc::new(LocalRuntime::new(health));
        let devices = Arc::new(DeviceSelector::new(ArchTable::with_overrides(
            &config.architectures,
        )));
        let provisioner = Provisioner::new(config.prototype_env_dir.clone(), devices);

        let mut registry = Self::new();
        for spec in &config.services {
            let supervisor = ServiceSupervisor::new(
                spec.clone(),
                runtime.clone(),
                provisioner.clone(),
                event_bus.clone(),
            )
            .with_stop_grace(config.stop_grace());
            registry.register(supervisor)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &std::path::Path) -> SupervisorConfig {
        let mut config = SupervisorConfig {
            base_dir: root.to_path_buf(),
            stop_grace_ms: 10,
            ..SupervisorConfig::default()
        };
        let mut second = config.services[0].clone();
        second.name = "comfyui-backend".into();
        second.port = 49000;
        second.env_dir = "comfyui-env".into();
        config.services.push(second);
        config.resolved().unwrap()
    }

    #[tokio::test]
    async fn test_lookup_and_listing_keep_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::from_config(&config(dir.path()), EventBus::new()).unwrap();

        assert_eq!(registry.names(), vec!["llamacpp-backend", "comfyui-backend"]);
        let listed = registry.list();
        assert_eq!(listed[1].port, 49000);
        assert!(listed
            .iter()
            .all(|info| info.status == ServiceStatus::NotInstalled));

        assert!(registry.get("comfyui-backend").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(SupervisorError::UnknownService(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn test_nothing_installed_means_nothing_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.services.iter_mut().for_each(|s| s.is_required = true);
        let registry = ServiceRegistry::from_config(&config, EventBus::new()).unwrap();
        assert!(registry.start_required().await.is_empty());

        registry.stop_all().await;
        assert!(registry
            .list()
            .iter()
            .all(|info| info.status == ServiceStatus::Stopped));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut registry = ServiceRegistry::from_config(&config, EventBus::new()).unwrap();
        let twin = registry.get("llamacpp-backend").unwrap().clone();
        assert!(registry.register(twin).is_err());
    }
}
