use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed
    pub activated: bool,
    pub version: i32,
}

/// Input for a user insert; the store assigns id, timestamps and version.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Who is making the current request.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }
}
