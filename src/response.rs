use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::error::ApiError;

/// `{"status":"success","data":...}` with the given status code.
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "status": "success", "data": data }))).into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    success(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> Response {
    success(StatusCode::CREATED, data)
}

/// JSON body extractor whose rejection uses the error envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}
