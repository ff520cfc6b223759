#![allow(dead_code)]

use service_supervisor::worker_spec::WorkerSpec;
use std::path::{Path, PathBuf};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes an executable `/bin/sh` script, creating `dir` if needed.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A worker rooted in `root`: `root/<name>` is its service dir and
/// `root/<name>-env` its environment.
pub fn worker(root: &Path, name: &str, port: u16) -> WorkerSpec {
    let service_dir = root.join(name);
    std::fs::create_dir_all(&service_dir).unwrap();
    serde_json::from_value(serde_json::json!({
        "name": name,
        "port": port,
        "service_dir": service_dir,
        "env_dir": root.join(format!("{}-env", name)),
        "args": ["worker.py", "--port", "{port}"],
    }))
    .unwrap()
}

/// Serves 200 on `/health` from an ephemeral port and returns the port.
pub async fn health_endpoint() -> u16 {
    let app = axum::Router::new().route("/health", axum::routing::get(|| async { "OK" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}
