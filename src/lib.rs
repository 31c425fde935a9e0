pub mod app;
pub mod auth;
pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod memory;
pub mod movies;
pub mod rate_limit;
pub mod response;
pub mod state;
pub mod validator;
