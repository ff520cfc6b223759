use super::{ApiError, AppState};
use crate::event_bus::SupervisorEvent;
use crate::runtime::WorkerRuntime;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use log::{info, warn};
use service_protocol::{ServiceInfo, StatusResponse};
use tokio::sync::broadcast::error::RecvError;

pub const NDJSON: &str = "application/x-ndjson";

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn list_services<R: WorkerRuntime + 'static>(
    State(state): State<AppState<R>>,
) -> Json<Vec<ServiceInfo>> {
    Json(state.registry.list())
}

pub async fn get_service<R: WorkerRuntime + 'static>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceInfo>, ApiError> {
    Ok(Json(state.registry.get(&name)?.info()))
}

pub async fn start_service<R: WorkerRuntime + 'static>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    info!("API: start requested for [{}]", name);
    let status = state.registry.get(&name)?.start().await?;
    Ok(Json(StatusResponse { status }))
}

pub async fn stop_service<R: WorkerRuntime + 'static>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    info!("API: stop requested for [{}]", name);
    let status = state.registry.get(&name)?.stop().await;
    Ok(Json(StatusResponse { status }))
}

/// Streams the provisioning log as newline-delimited JSON.
///
/// Closing the connection early drops the sequence, which fails the setup.
pub async fn set_up_service<R: WorkerRuntime + 'static>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    info!("API: setup requested for [{}]", name);
    let progress = state.registry.get(&name)?.set_up()?;
    let lines = progress.map(|record| {
        serde_json::to_vec(&record).map(|mut line| {
            line.push(b'\n');
            line
        })
    });
    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

pub async fn ws_handler<R: WorkerRuntime + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<R: WorkerRuntime + 'static>(mut socket: WebSocket, state: AppState<R>) {
    // Subscribe before the initial snapshots so no transition falls in between.
    let mut rx = state.event_bus.subscribe();

    for info in state.registry.list() {
        if !send_info(&mut socket, &info).await {
            return;
        }
    }

    loop {
        match rx.recv().await {
            Ok(SupervisorEvent::ServiceInfoUpdated { info }) => {
                if !send_info(&mut socket, &info).await {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("API: websocket observer lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_info(socket: &mut WebSocket, info: &ServiceInfo) -> bool {
    let text = match serde_json::to_string(info) {
        Ok(text) => text,
        Err(e) => {
            warn!("API: cannot encode snapshot: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(text)).await.is_ok()
}
