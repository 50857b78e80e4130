use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rmap_core::{ErrorEnvelope, MapError};

pub struct AppError {
    pub status: StatusCode,
    pub body: ErrorEnvelope,
}

impl AppError {
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorEnvelope::internal(&msg.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_for(err: &MapError) -> StatusCode {
    match err {
        MapError::NotFound(_) => StatusCode::NOT_FOUND,
        MapError::Unsupported(_) | MapError::QueryUnsupported(_) => StatusCode::NOT_IMPLEMENTED,
        MapError::IllegalArgument(_) | MapError::QuerySyntax(_) => StatusCode::BAD_REQUEST,
        MapError::Authentication(_) => StatusCode::FORBIDDEN,
        MapError::Persistence(_) => StatusCode::BAD_GATEWAY,
        MapError::Disposed => StatusCode::SERVICE_UNAVAILABLE,
        MapError::InternalInvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<MapError> for AppError {
    fn from(err: MapError) -> Self {
        Self {
            status: status_for(&err),
            body: err.envelope(),
        }
    }
}
