use time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::{
        repo::TokenStore,
        token::{Token, TokenScope},
    },
    error::ApiError,
    validator::{is_valid_email, Validator},
};

const PASSWORD_MIN_BYTES: usize = 8;
const PASSWORD_MAX_BYTES: usize = 72;

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(email.is_empty(), "email", "must not be empty");
    v.check(!is_valid_email(email), "email", "must be a valid email address");
}

fn password_is_strong(password: &str) -> bool {
    if !(PASSWORD_MIN_BYTES..=PASSWORD_MAX_BYTES).contains(&password.len()) {
        return false;
    }
    let (mut upper, mut lower, mut digit, mut special) = (false, false, false, false);
    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_numeric() {
            digit = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace()) {
            special = true;
        }
    }
    upper && lower && digit && special
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(password.is_empty(), "password", "must be provided");
    v.check(!password_is_strong(password), "password", "is invalid");
}

pub fn validate_user_name(v: &mut Validator, name: &str) {
    v.check(name.trim().is_empty(), "name", "must be provided");
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Generates a token and persists its hash. The returned value is the only
/// place the plaintext ever exists.
pub async fn issue_token(
    tokens: &dyn TokenStore,
    user_id: Uuid,
    ttl: Duration,
    scope: TokenScope,
) -> Result<Token, ApiError> {
    let token = Token::generate(user_id, ttl, scope).map_err(ApiError::internal)?;
    tokens.insert(&token).await.map_err(ApiError::internal)?;
    debug!(user_id = %user_id, scope = scope.as_str(), "token issued");
    Ok(token)
}

/// Runs the expensive password hash off the async executor.
pub async fn hash_password_blocking(plain: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || super::password::hash_password(&plain))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::Internal)
}

pub async fn verify_password_blocking(plain: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || super::password::verify_password(&plain, &hash))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(f: impl FnOnce(&mut Validator)) -> bool {
        let mut v = Validator::new();
        f(&mut v);
        v.valid()
    }

    #[test]
    fn password_rules() {
        assert!(errors_for(|v| validate_password_plaintext(v, "Password1!")));
        assert!(!errors_for(|v| validate_password_plaintext(v, "password1!")));
        assert!(!errors_for(|v| validate_password_plaintext(v, "PASSWORD1!")));
        assert!(!errors_for(|v| validate_password_plaintext(v, "Password!!")));
        assert!(!errors_for(|v| validate_password_plaintext(v, "Password12")));
        assert!(!errors_for(|v| validate_password_plaintext(v, "Pa1!")));
        let too_long = format!("Pa1!{}", "a".repeat(69));
        assert!(!errors_for(|v| validate_password_plaintext(v, &too_long)));
    }

    #[test]
    fn email_and_name_rules() {
        assert!(errors_for(|v| validate_email(v, "a@x.com")));
        assert!(!errors_for(|v| validate_email(v, "")));
        assert!(!errors_for(|v| validate_user_name(v, "   ")));
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[tokio::test]
    async fn issued_token_is_findable_by_plaintext_only() {
        use crate::auth::{repo::UserStore, repo_types::NewUser, token::AUTHENTICATION_TTL};
        use crate::memory::MemoryStore;

        let store = MemoryStore::new();
        let user = UserStore::insert(
            &store,
            NewUser {
                name: "Ada".into(),
                email: "ada@x.com".into(),
                password_hash: "h".into(),
            },
        )
        .await
        .unwrap();

        let token = issue_token(&store, user.id, AUTHENTICATION_TTL, TokenScope::Authentication)
            .await
            .unwrap();
        let found = store
            .find_user_by_token(TokenScope::Authentication, &token.plaintext)
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
        assert!(store
            .find_user_by_token(TokenScope::Activation, &token.plaintext)
            .await
            .is_err());
    }
}
