pub mod client;
pub mod messages;
pub mod model;

pub use client::SupervisorClient;
pub use messages::{ErrorResponse, StatusResponse};
pub use model::{ServiceInfo, ServiceStatus, SetupProgress, SetupStatus};
