//! Opaque bearer tokens.
//!
//! A token is 16 random bytes, base-32 encoded without padding into a
//! 26-character plaintext. Only the SHA-256 digest of the plaintext is ever
//! stored; lookups always go hash -> token.

use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::validator::Validator;

pub const TOKEN_PLAINTEXT_LEN: usize = 26;
const TOKEN_ENTROPY_BYTES: usize = 16;

pub const ACTIVATION_TTL: Duration = Duration::days(3);
pub const AUTHENTICATION_TTL: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
        }
    }
}

#[derive(Debug, Error)]
#[error("entropy source unavailable: {0}")]
pub struct EntropyError(#[from] rand::Error);

/// A freshly issued token. `plaintext` exists only on this value and is
/// handed to the caller once; storage sees `hash`.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(skip)]
    pub scope: TokenScope,
}

impl Token {
    pub fn generate(user_id: Uuid, ttl: Duration, scope: TokenScope) -> Result<Self, EntropyError> {
        let mut random = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.try_fill_bytes(&mut random)?;
        let plaintext = BASE32_NOPAD.encode(&random);
        let hash = hash_token(&plaintext);
        Ok(Self {
            plaintext,
            hash,
            user_id,
            expiry: OffsetDateTime::now_utc() + ttl,
            scope,
        })
    }
}

/// Deterministic one-way digest used at issuance and at verification.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() != TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_plaintext_is_26_base32_chars() {
        let token = Token::generate(Uuid::new_v4(), AUTHENTICATION_TTL, TokenScope::Authentication)
            .expect("os rng available");
        assert_eq!(token.plaintext.len(), TOKEN_PLAINTEXT_LEN);
        assert!(token
            .plaintext
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_eq!(token.hash, hash_token(&token.plaintext));
        assert_eq!(token.hash.len(), 32);
    }

    #[test]
    fn hash_is_deterministic_and_distinguishes_plaintexts() {
        assert_eq!(hash_token("ABCDEFGHIJKLMNOPQRSTUVWXYZ"), hash_token("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert_ne!(hash_token("ABCDEFGHIJKLMNOPQRSTUVWXYZ"), hash_token("ABCDEFGHIJKLMNOPQRSTUVWXY2"));
    }

    #[test]
    fn expiry_is_now_plus_ttl() {
        let before = OffsetDateTime::now_utc();
        let token = Token::generate(Uuid::new_v4(), ACTIVATION_TTL, TokenScope::Activation).unwrap();
        let after = OffsetDateTime::now_utc();
        assert!(token.expiry >= before + ACTIVATION_TTL);
        assert!(token.expiry <= after + ACTIVATION_TTL);
    }

    #[test]
    fn serialized_token_exposes_only_plaintext_and_expiry() {
        let token = Token::generate(Uuid::new_v4(), AUTHENTICATION_TTL, TokenScope::Authentication).unwrap();
        let value = serde_json::to_value(&token).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["token"], token.plaintext);
        assert!(obj.contains_key("expiry"));
    }

    #[test]
    fn plaintext_format_validation() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "short");
        assert!(!v.valid());

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "");
        assert!(!v.valid());

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert!(v.valid());
    }
}
