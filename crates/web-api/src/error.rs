use application::{ApplicationError, AuthFailure};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::RepositoryError;
use serde::Serialize;

/// 错误响应体，HTTP 响应和 WebSocket `error` 帧共用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(code, message),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        let code = match failure {
            AuthFailure::MissingCredential => "MISSING_CREDENTIAL",
            AuthFailure::InvalidCredential => "INVALID_CREDENTIAL",
            AuthFailure::UnknownOrInactiveUser => "UNKNOWN_OR_INACTIVE_USER",
        };
        ApiError::new(StatusCode::UNAUTHORIZED, code, failure.to_string())
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        match error {
            AppErr::Authentication(failure) => failure.into(),
            AppErr::Authorization(reason) => ApiError::forbidden(reason),
            AppErr::NotFound(what) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
            }
            AppErr::Validation(err) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", err.to_string())
            }
            AppErr::Persistence(RepositoryError::Timeout { millis }) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "PERSISTENCE_TIMEOUT",
                format!("storage did not respond within {millis}ms"),
            ),
            AppErr::Persistence(err) => {
                tracing::error!(error = %err, "persistence failure");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PERSISTENCE_FAILURE",
                    "storage is unavailable",
                )
            }
            AppErr::ConnectionClosed => {
                ApiError::new(StatusCode::GONE, "CONNECTION_CLOSED", "connection closed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
