use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::{
    auth::{
        authorize::require_permission,
        permissions::PermissionCode,
        repo_types::{Identity, User},
        token::{validate_token_plaintext, TokenScope},
    },
    db::StoreError,
    error::ApiError,
    state::AppState,
    validator::Validator,
};

/// Resolves the `Authorization` header into an [`Identity`] stored in the
/// request extensions. No header means anonymous; every malformed, unknown or
/// expired token gets the same 401. Every response, rejections included,
/// varies on `Authorization`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = resolve_identity(&state, request.headers().get(header::AUTHORIZATION)).await;
    let mut response = match resolved {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_identity(
    state: &AppState,
    header: Option<&HeaderValue>,
) -> Result<Identity, ApiError> {
    // An empty header counts as no header.
    let Some(header) = header.filter(|h| !h.as_bytes().iter().all(u8::is_ascii_whitespace)) else {
        return Ok(Identity::Anonymous);
    };

    let value = header.to_str().map_err(|_| ApiError::InvalidAuthToken)?;
    let parts: Vec<&str> = value.split_whitespace().collect();
    let [scheme, token] = parts.as_slice() else {
        debug!("authorization header is not two fields");
        return Err(ApiError::InvalidAuthToken);
    };
    if *scheme != "Bearer" {
        debug!("unsupported authorization scheme");
        return Err(ApiError::InvalidAuthToken);
    }

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.valid() {
        debug!("malformed bearer token");
        return Err(ApiError::InvalidAuthToken);
    }

    match state
        .tokens
        .find_user_by_token(TokenScope::Authentication, token)
        .await
    {
        Ok(user) => Ok(Identity::Authenticated(user)),
        Err(StoreError::NotFound) => {
            warn!("unknown or expired bearer token");
            Err(ApiError::InvalidAuthToken)
        }
        Err(e) => Err(ApiError::internal(e)),
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("authenticate middleware not installed")))
    }
}

/// An activated user holding permission `P`.
pub struct Authorized<P> {
    pub user: User,
    _permission: PhantomData<P>,
}

#[async_trait]
impl<P: PermissionCode> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        let user = require_permission(&identity, P::CODE, state.permissions.as_ref())
            .await?
            .clone();
        Ok(Self {
            user,
            _permission: PhantomData,
        })
    }
}
