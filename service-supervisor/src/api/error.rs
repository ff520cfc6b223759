use crate::error::SupervisorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::warn;
use service_protocol::ErrorResponse;

/// A [`SupervisorError`] on its way to an HTTP client.
#[derive(Debug)]
pub struct ApiError(pub SupervisorError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            SupervisorError::Conflict(_) => StatusCode::CONFLICT,
            SupervisorError::UnknownService(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!("API: request failed with {}: {}", status, self.0);
        (status, Json(ErrorResponse::new(self.0.to_string()))).into_response()
    }
}
