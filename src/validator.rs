use std::{collections::HashSet, hash::Hash};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ApiError, FieldErrors};

/// Collects per-field validation messages. The first message for a field wins.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Records `message` under `key` when `invalid` holds.
    pub fn check(&mut self, invalid: bool, key: &str, message: &str) {
        if invalid {
            self.add_error(key, message);
        }
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.valid() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    values.iter().collect::<HashSet<_>>().len() == values.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_per_field_wins() {
        let mut v = Validator::new();
        v.check(true, "email", "must not be empty");
        v.check(true, "email", "must be a valid email address");
        v.check(false, "name", "must be provided");
        match v.into_result() {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors["email"], "must not be empty");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn uniqueness() {
        assert!(unique(&["drama", "comedy"]));
        assert!(!unique(&["drama", "drama"]));
    }
}
