//! Maps `AppError` onto HTTP responses with a JSON body.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tm_core::AppError;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Handler-level error. Internal failures are logged here and reach the
/// client only as an opaque message.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(AppError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        let field = rejected_field(&message).unwrap_or("body").to_string();
        Self(AppError::validation(field, message))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(AppError::validation("query", rejection.body_text()))
    }
}

/// Pulls the offending field out of a serde decode message, e.g.
/// "missing field `rating`" or "rating: invalid type: ...".
fn rejected_field(message: &str) -> Option<&str> {
    if let Some(rest) = message.split("missing field `").nth(1) {
        return rest.split('`').next();
    }
    let detail = message.rsplit("target type: ").next()?;
    let (path, _) = detail.split_once(": ")?;
    let is_path = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    is_path.then_some(path)
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(self) -> ErrorBody {
        match self.0 {
            AppError::NotFound(entity, id) => ErrorBody {
                error: "not_found",
                message: format!("{entity} {id} not found"),
                field: None,
            },
            AppError::ValidationError { field, message } => ErrorBody {
                error: "validation",
                message,
                field: Some(field),
            },
            AppError::Unauthorized(message) => ErrorBody {
                error: "unauthorized",
                message,
                field: None,
            },
            AppError::Forbidden(message) => ErrorBody {
                error: "forbidden",
                message,
                field: None,
            },
            AppError::Conflict(message) => ErrorBody {
                error: "conflict",
                message,
                field: None,
            },
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed");
                ErrorBody {
                    error: "internal",
                    message: "internal server error".into(),
                    field: None,
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
