//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roomcast_relay::RelayError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidFrame(_) => StatusCode::BAD_REQUEST,
            GatewayError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Relay(RelayError::EmptyRoom) => StatusCode::BAD_REQUEST,
            GatewayError::Relay(error) if error.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": status.as_str(),
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::InvalidFrame(error.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
