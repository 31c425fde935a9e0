use axum::{
    extract::State,
    response::Response,
    routing::{post, put},
    Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{ActivateRequest, AuthenticationTokenResponse, LoginRequest, RegisterRequest, UserResponse},
        permissions::MOVIES_READ,
        repo_types::NewUser,
        services::{
            hash_password_blocking, issue_token, normalize_email, validate_email,
            validate_password_plaintext, validate_user_name, verify_password_blocking,
        },
        token::{validate_token_plaintext, TokenScope, ACTIVATION_TTL, AUTHENTICATION_TTL},
    },
    db::StoreError,
    error::ApiError,
    response::{created, ok, JsonBody},
    state::AppState,
    validator::Validator,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/activated", put(activate))
}

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/tokens/authentication", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(mut payload): JsonBody<RegisterRequest>,
) -> Result<Response, ApiError> {
    payload.email = normalize_email(&payload.email);

    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    validate_user_name(&mut v, &payload.name);
    v.into_result()?;

    let password_hash = hash_password_blocking(payload.password).await?;

    let new_user = NewUser {
        name: payload.name.trim().to_string(),
        email: payload.email,
        password_hash,
    };
    let user = match state.users.insert(new_user).await {
        Ok(u) => u,
        Err(StoreError::DuplicateEmail) => {
            warn!("email already registered");
            return Err(ApiError::field(
                "email",
                "a user with this email address already exists",
            ));
        }
        Err(e) => return Err(ApiError::internal(e)),
    };

    state
        .permissions
        .add_for_user(user.id, &[MOVIES_READ])
        .await
        .map_err(ApiError::internal)?;

    let token = issue_token(
        state.tokens.as_ref(),
        user.id,
        ACTIVATION_TTL,
        TokenScope::Activation,
    )
    .await?;

    let mailer = state.mailer.clone();
    let (email, user_id) = (user.email.clone(), user.id);
    state.background.spawn("welcome email", async move {
        mailer.send_welcome(&email, user_id, &token.plaintext).await
    });

    info!(user_id = %user.id, "user registered");
    Ok(created(UserResponse { user }))
}

#[instrument(skip(state, payload))]
pub async fn activate(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ActivateRequest>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    v.into_result()?;

    let mut user = match state
        .tokens
        .find_user_by_token(TokenScope::Activation, &payload.token)
        .await
    {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            return Err(ApiError::field("token", "invalid or expired activation token"));
        }
        Err(e) => return Err(ApiError::internal(e)),
    };

    user.activated = true;
    user.version = state.users.update(&user).await?;

    state
        .tokens
        .delete_all_for_user(TokenScope::Activation, user.id)
        .await
        .map_err(ApiError::internal)?;

    info!(user_id = %user.id, "user activated");
    Ok(ok(UserResponse { user }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(mut payload): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    payload.email = normalize_email(&payload.email);

    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.into_result()?;

    let user = match state.users.get_by_email(&payload.email).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            warn!("login unknown email");
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(ApiError::internal(e)),
    };

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = issue_token(
        state.tokens.as_ref(),
        user.id,
        AUTHENTICATION_TTL,
        TokenScope::Authentication,
    )
    .await?;

    info!(user_id = %user.id, "user logged in");
    Ok(created(AuthenticationTokenResponse {
        authentication_token: token,
    }))
}
