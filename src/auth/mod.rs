//! Authentication core: password hashing, token codec, OTP challenges and
//! per-request actor resolution.

pub mod authenticator;
pub mod credentials;
pub mod otp;
pub mod password;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::otp::{OtpChannel, OtpStore};
use crate::auth::password::PasswordHasher;
use crate::auth::token::TokenCodec;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: u64 = 5 * 60;

/// Authentication settings, environment-driven via the CLI layer.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: i64,
    otp_ttl_seconds: u64,
    otp_required: bool,
    cookie_secure: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_required: true,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_required(mut self, required: bool) -> Self {
        self.otp_required = required;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> u64 {
        self.otp_ttl_seconds
    }

    /// When false, the OTP challenge auto-succeeds and `login` issues a token
    /// directly (single-step login).
    #[must_use]
    pub fn otp_required(&self) -> bool {
        self.otp_required
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared per-process authentication state, installed as an axum extension.
pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
    hasher: Arc<PasswordHasher>,
    otp: OtpStore,
    channel: Arc<dyn OtpChannel>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        codec: TokenCodec,
        hasher: Arc<PasswordHasher>,
        channel: Arc<dyn OtpChannel>,
    ) -> Self {
        let otp = OtpStore::new(Duration::from_secs(config.otp_ttl_seconds()));
        Self {
            config,
            codec,
            hasher,
            otp,
            channel,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn hasher(&self) -> Arc<PasswordHasher> {
        Arc::clone(&self.hasher)
    }

    #[must_use]
    pub fn otp(&self) -> &OtpStore {
        &self.otp
    }

    #[must_use]
    pub fn channel(&self) -> &dyn OtpChannel {
        self.channel.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_contract() {
        let config = AuthConfig::new();
        assert_eq!(config.token_ttl_seconds(), 3600);
        assert_eq!(config.otp_ttl_seconds(), 300);
        assert!(config.otp_required());
        assert!(!config.cookie_secure());
    }

    #[test]
    fn config_builders_override_defaults() {
        let config = AuthConfig::new()
            .with_token_ttl_seconds(60)
            .with_otp_ttl_seconds(30)
            .with_otp_required(false)
            .with_cookie_secure(true);
        assert_eq!(config.token_ttl_seconds(), 60);
        assert_eq!(config.otp_ttl_seconds(), 30);
        assert!(!config.otp_required());
        assert!(config.cookie_secure());
    }
}
