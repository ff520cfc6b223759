//! Per-service lifecycle state machine.

pub mod service;
pub mod state;

pub use service::{ServiceSupervisor, DEFAULT_STOP_GRACE};
pub use state::ServiceState;
