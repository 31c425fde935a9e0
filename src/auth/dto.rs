use serde::{Deserialize, Serialize};

use crate::auth::{repo_types::User, token::Token};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for account activation.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    #[serde(default)]
    pub token: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationTokenResponse {
    pub authentication_token: Token,
}
