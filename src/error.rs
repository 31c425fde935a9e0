//! API-facing error taxonomy.
//!
//! Expected domain outcomes map to a specific status and message. Anything
//! unrecognized is logged with full context and surfaced as a bare 500.

use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;

/// Field name -> first validation message for that field.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed validation")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("invalid or missing authentication token")]
    InvalidAuthToken,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("the server encountered a problem and could not process your request")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    /// Single-field validation failure.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), message.to_string());
        Self::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::InvalidAuthToken => StatusCode::UNAUTHORIZED,
            Self::InactiveAccount | Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Storage outcomes that carry no special meaning at the call site.
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::EditConflict => Self::EditConflict,
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(errors) => (
                status,
                Json(json!({ "status": "failed", "errors": errors })),
            )
                .into_response(),
            Self::Internal(ref err) => {
                tracing::error!(error = ?err, "request failed");
                error_body(status, &self.to_string())
            }
            Self::InvalidAuthToken => {
                let mut res = error_body(status, &self.to_string());
                res.headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                res
            }
            other => error_body(status, &other.to_string()),
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}
