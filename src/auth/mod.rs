use crate::state::AppState;
use axum::Router;

pub mod authorize;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod password;
pub mod permissions;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod token;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::user_routes())
        .merge(handlers::token_routes())
}
