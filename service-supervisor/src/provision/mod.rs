//! Environment provisioning: clone, detect device, install, relocate.
//!
//! The pipeline is exposed as a lazy stream of [`SetupProgress`] records. No
//! step runs until the consumer polls for the record that follows it, and a
//! failing step ends the stream with a single `failed` record instead of an
//! error.

pub mod command;
pub mod steps;

pub use steps::{PipelineContext, SetupStep};

use crate::device::DeviceSelector;
use crate::worker_spec::WorkerSpec;
use futures::stream::{self, Stream};
use log::{error, info};
use service_protocol::SetupProgress;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds provisioning pipelines for any [`WorkerSpec`].
#[derive(Clone)]
pub struct Provisioner {
    prototype_env: PathBuf,
    devices: Arc<DeviceSelector>,
}

#[derive(Clone, Copy)]
enum Cursor {
    Start,
    Announce(usize),
    Run(usize),
    Finished,
}

struct Pipeline {
    context: PipelineContext,
    steps: Vec<SetupStep>,
    cursor: Cursor,
}

impl Provisioner {
    pub fn new(prototype_env: PathBuf, devices: Arc<DeviceSelector>) -> Self {
        Self {
            prototype_env,
            devices,
        }
    }

    /// Device selection shared with every supervisor using this provisioner.
    pub fn devices(&self) -> &Arc<DeviceSelector> {
        &self.devices
    }

    pub fn steps_for(&self, spec: &WorkerSpec) -> Vec<SetupStep> {
        SetupStep::plan(spec)
    }

    /// Lazy, finite, non-restartable progress sequence for provisioning `spec`.
    pub fn pipeline(
        &self,
        spec: Arc<WorkerSpec>,
    ) -> impl Stream<Item = SetupProgress> + Send + 'static {
        let steps = self.steps_for(&spec);
        let context = PipelineContext::new(spec, self.prototype_env.clone(), self.devices.clone());
        let pipeline = Pipeline {
            context,
            steps,
            cursor: Cursor::Start,
        };

        stream::unfold(pipeline, |mut p| async move {
            let name = p.context.spec.name.clone();
            match p.cursor {
                Cursor::Start => {
                    info!("Provisioner: [{}] starting to set up python environment", name);
                    p.cursor = Cursor::Announce(0);
                    let record = SetupProgress::executing(
                        name,
                        "start",
                        "starting to set up python environment",
                    );
                    Some((record, p))
                }
                Cursor::Announce(i) if i >= p.steps.len() => {
                    info!("Provisioner: [{}] service set up completely", name);
                    p.cursor = Cursor::Finished;
                    Some((SetupProgress::success(name, "service set up completely"), p))
                }
                Cursor::Announce(i) => {
                    let step = p.steps[i];
                    let record =
                        SetupProgress::executing(name, step.label(), p.context.announcement(step));
                    p.cursor = Cursor::Run(i);
                    Some((record, p))
                }
                Cursor::Run(i) => {
                    let step = p.steps[i];
                    match p.context.run(step).await {
                        Ok(message) => {
                            p.cursor = Cursor::Announce(i + 1);
                            Some((SetupProgress::executing(name, step.label(), message), p))
                        }
                        Err(e) => {
                            error!("Provisioner: [{}] {}", name, e);
                            p.cursor = Cursor::Finished;
                            let record = SetupProgress::failed(
                                name,
                                format!("Failed to setup python environment due to {}", e),
                            );
                            Some((record, p))
                        }
                    }
                }
                Cursor::Finished => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ArchTable;
    use futures::StreamExt;
    use service_protocol::SetupStatus;

    fn spec(root: &std::path::Path) -> WorkerSpec {
        serde_json::from_value(serde_json::json!({
            "name": "svc",
            "port": 39999,
            "service_dir": root.join("service"),
            "env_dir": root.join("svc-env"),
        }))
        .unwrap()
    }

    #[test]
    fn test_device_detection_only_planned_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Provisioner::new(
            dir.path().join("proto"),
            Arc::new(DeviceSelector::new(ArchTable::builtin())),
        );
        let mut spec = spec(dir.path());
        assert_eq!(provisioner.steps_for(&spec).len(), 4);

        spec.device_selection = Some(crate::worker_spec::DeviceSelectionSpec {
            helper_source: "ls_devices".into(),
            helper_in_env: "tools/ls_devices".into(),
            helper_requirements: None,
        });
        let steps = provisioner.steps_for(&spec);
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[1], SetupStep::DetectDevice);
    }

    #[tokio::test]
    async fn test_missing_prototype_fails_at_first_step() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let provisioner = Provisioner::new(
            dir.path().join("does-not-exist"),
            Arc::new(DeviceSelector::new(ArchTable::builtin())),
        );

        let records: Vec<_> = provisioner
            .pipeline(Arc::new(spec(dir.path())))
            .collect()
            .await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].step, "start");
        assert_eq!(records[1].step, "preparing work directory");
        assert_eq!(records[2].step, "end");
        assert_eq!(records[2].status, SetupStatus::Failed);
        assert!(records[2].debug_message.contains("preparing work directory"));
        assert!(records[..2].iter().all(|r| !r.is_terminal()));
    }

    #[tokio::test]
    async fn test_pipeline_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let proto = dir.path().join("proto");
        std::fs::create_dir_all(&proto).unwrap();
        let spec = Arc::new(spec(dir.path()));
        let provisioner =
            Provisioner::new(proto, Arc::new(DeviceSelector::new(ArchTable::builtin())));

        let mut progress = Box::pin(provisioner.pipeline(spec.clone()));
        progress.next().await.unwrap();
        progress.next().await.unwrap();
        // the copy only runs once the completion record is requested
        assert!(!spec.scratch_dir().exists());
        let done = progress.next().await.unwrap();
        assert_eq!(done.status, SetupStatus::Executing);
        assert!(spec.scratch_dir().exists());
    }
}
