//! Supervisor for long-lived local worker services.
//!
//! A worker is described by a [`worker_spec::WorkerSpec`]. The
//! [`supervisor::ServiceSupervisor`] provisions its python environment,
//! launches it with the selected compute device, waits for its health
//! endpoint and keeps observers informed through the [`event_bus::EventBus`].

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod event_bus;
pub mod health;
pub mod process;
pub mod provision;
pub mod registry;
pub mod runtime;
pub mod supervisor;
pub mod worker_spec;

pub use error::{Result, SupervisorError};
