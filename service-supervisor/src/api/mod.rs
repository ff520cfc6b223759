//! HTTP and WebSocket API of the daemon.
//!
//! Every route is a thin adapter over [`ServiceRegistry`]; status snapshots
//! pushed on `/ws` come straight from the [`EventBus`].

mod error;
mod handlers;

pub use error::ApiError;

use crate::event_bus::EventBus;
use crate::registry::ServiceRegistry;
use crate::runtime::WorkerRuntime;
use axum::{
    routing::{get, post},
    Router,
};
use log::info;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// App State to share with routes
pub struct AppState<R: WorkerRuntime> {
    pub registry: ServiceRegistry<R>,
    pub event_bus: EventBus,
}

impl<R: WorkerRuntime> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            event_bus: self.event_bus.clone(),
        }
    }
}

pub fn router<R: WorkerRuntime + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ws", get(handlers::ws_handler::<R>))
        .route("/services", get(handlers::list_services::<R>))
        .route("/services/:name", get(handlers::get_service::<R>))
        .route("/services/:name/setup", post(handlers::set_up_service::<R>))
        .route("/services/:name/start", post(handlers::start_service::<R>))
        .route("/services/:name/stop", post(handlers::stop_service::<R>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves the API until the listener fails.
pub async fn serve<R: WorkerRuntime + 'static>(
    addr: SocketAddr,
    state: AppState<R>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API: Server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
