use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Everything needed to spawn one worker process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LaunchCommand {
    name: String,
    executable: PathBuf,
    args: Vec<String>,
    work_dir: PathBuf,
    /// Merged over the inherited environment; these win on collision.
    env: HashMap<String, String>,
}

impl LaunchCommand {
    pub fn new(
        name: String,
        executable: PathBuf,
        args: Vec<String>,
        work_dir: PathBuf,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            name,
            executable,
            args,
            work_dir,
            env,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    pub fn args(&self) -> &Vec<String> {
        &self.args
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}
