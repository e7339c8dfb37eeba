//! Route handlers for the delivery tracking API.
//!
//! Entity CRUD is generic over the kind registry; authentication and the
//! audit journal get dedicated handlers.

pub mod audit;
pub mod auth;
pub mod entities;
pub mod health;
pub mod root;

use regex::Regex;

/// Lightweight email sanity check used before persisting an account.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Minimum password length accepted at registration.
const MIN_PASSWORD_CHARS: usize = 4;

#[must_use]
pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_CHARS
}

/// Usernames are URL- and log-safe identifiers.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{1,63}$").is_ok_and(|re| re.is_match(username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_accepts_simple() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("a@x"));
    }

    #[test]
    fn valid_email_rejects_missing_at() {
        assert!(!valid_email("user.example.com"));
        assert!(!valid_email("two words@example.com"));
    }

    #[test]
    fn valid_password_enforces_minimum_length() {
        assert!(valid_password("p@ss"));
        assert!(!valid_password("abc"));
    }

    #[test]
    fn valid_username_rejects_spaces_and_slashes() {
        assert!(valid_username("ana.maria"));
        assert!(valid_username("dev-01"));
        assert!(!valid_username("a"));
        assert!(!valid_username("has space"));
        assert!(!valid_username("path/traversal"));
    }
}
