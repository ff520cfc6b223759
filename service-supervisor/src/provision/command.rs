use crate::error::{Result, SupervisorError};
use crate::process::logs::forward_debug;
use log::info;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Runs an installer subprocess to completion, forwarding its output at debug level.
///
/// There is no timeout: a hanging installer hangs the step.
pub async fn run_command(service: &str, program: &Path, args: &[String]) -> Result<()> {
    let rendered = format!("{} {}", program.display(), args.join(" "));
    info!("Provisioner: [{}] running {}", service, rendered);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SupervisorError::Launch {
            executable: program.to_path_buf(),
            source: e,
        })?;

    let target = format!("provision::{}", service);
    let stdout = child.stdout.take().map(|s| forward_debug(s, target.clone()));
    let stderr = child.stderr.take().map(|s| forward_debug(s, target));

    let status = child.wait().await?;
    for forwarder in [stdout, stderr].into_iter().flatten() {
        let _ = forwarder.await;
    }

    if !status.success() {
        return Err(SupervisorError::Command {
            command: rendered,
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_non_zero_exit_names_the_command() {
        let args = vec!["-c".to_string(), "echo partial output; exit 4".to_string()];
        match run_command("svc", &PathBuf::from("/bin/sh"), &args).await {
            Err(SupervisorError::Command { command, status }) => {
                assert!(command.starts_with("/bin/sh -c"), "{}", command);
                assert!(status.contains('4'), "{}", status);
            }
            other => panic!("expected command failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success() {
        let args = vec!["-c".to_string(), "true".to_string()];
        run_command("svc", &PathBuf::from("/bin/sh"), &args)
            .await
            .unwrap();
    }
}
