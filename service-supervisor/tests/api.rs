//! The HTTP API driven through the protocol client.
#![cfg(unix)]

mod common;

use futures::StreamExt;
use service_protocol::client::ClientError;
use service_protocol::{ServiceStatus, SetupStatus, SupervisorClient};
use service_supervisor::api::{self, AppState};
use service_supervisor::config::SupervisorConfig;
use service_supervisor::event_bus::EventBus;
use service_supervisor::registry::ServiceRegistry;
use std::path::Path;

/// Serves the API for `config` on an ephemeral port.
async fn daemon(config: SupervisorConfig) -> SupervisorClient {
    let event_bus = EventBus::new();
    let registry = ServiceRegistry::from_config(&config, event_bus.clone()).unwrap();
    let app = api::router(AppState {
        registry,
        event_bus,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    SupervisorClient::new(format!("http://{}", addr))
}

fn config(root: &Path) -> SupervisorConfig {
    SupervisorConfig {
        base_dir: root.to_path_buf(),
        stop_grace_ms: 50,
        health_timeout_ms: 5_000,
        health_interval_ms: 20,
        services: Vec::new(),
        ..SupervisorConfig::default()
    }
}

#[tokio::test]
async fn test_start_and_stop_an_installed_worker() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let port = common::health_endpoint().await;

    // The fake worker just stays alive; readiness comes from the test endpoint.
    let spec = common::worker(dir.path(), "echo-backend", port);
    common::write_script(&spec.env_dir.join("bin"), "python3", "exec sleep 30");

    let mut config = config(dir.path());
    config.services.push(spec);
    let client = daemon(config.resolved().unwrap()).await;

    let listed = client.list_services().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ServiceStatus::NotYetStarted);
    assert!(listed[0].is_set_up);

    assert_eq!(client.start("echo-backend").await.unwrap(), ServiceStatus::Running);
    assert_eq!(
        client.service("echo-backend").await.unwrap().status,
        ServiceStatus::Running
    );

    match client.set_up("echo-backend").await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 409),
        Err(other) => panic!("expected conflict, got {:?}", other),
        Ok(_) => panic!("setup accepted while running"),
    }

    assert_eq!(client.stop("echo-backend").await.unwrap(), ServiceStatus::Stopped);
    assert_eq!(
        client.service("echo-backend").await.unwrap().status,
        ServiceStatus::Stopped
    );
}

#[tokio::test]
async fn test_worker_that_exits_early_is_failed() {
    let dir = tempfile::tempdir().unwrap();
    // nothing listens on this port
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let spec = common::worker(dir.path(), "crashy", port);
    common::write_script(&spec.env_dir.join("bin"), "python3", "echo 'Traceback' >&2\nexit 1");

    let mut config = config(dir.path());
    config.services.push(spec);
    let client = daemon(config.resolved().unwrap()).await;

    assert_eq!(client.start("crashy").await.unwrap(), ServiceStatus::Failed);
    assert_eq!(
        client.service("crashy").await.unwrap().status,
        ServiceStatus::Failed
    );
}

#[tokio::test]
async fn test_unknown_service_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let client = daemon(config(dir.path()).resolved().unwrap()).await;

    match client.start("ghost").await {
        Err(ClientError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.contains("ghost"));
        }
        other => panic!("expected 404, got {:?}", other),
    }
}

#[tokio::test]
async fn test_setup_streams_progress_until_terminal_record() {
    let dir = tempfile::tempdir().unwrap();
    let spec = common::worker(dir.path(), "unprovisioned", 39400);
    let mut config = config(dir.path());
    config.services.push(spec);
    // no prototype environment: the first step fails
    let client = daemon(config.resolved().unwrap()).await;

    let records: Vec<_> = client
        .set_up("unprovisioned")
        .await
        .unwrap()
        .collect()
        .await;
    let records: Vec<_> = records.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(records.first().unwrap().step, "start");
    let last = records.last().unwrap();
    assert_eq!(last.step, "end");
    assert_eq!(last.status, SetupStatus::Failed);

    assert_eq!(
        client.service("unprovisioned").await.unwrap().status,
        ServiceStatus::InstallationFailed
    );
}
