use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::pricing::ScenarioError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors that reach the binary or an HTTP response. Discovery and per-program
/// pricing failures never appear here; they degrade inside the session.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Scenario(ScenarioError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Scenario(ScenarioError::NothingToSave) => StatusCode::CONFLICT,
            AppError::Scenario(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Telemetry(_) | AppError::Io(_) | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
