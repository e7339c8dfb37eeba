//! Signed session token encode/decode (HS256).
//!
//! The signing secret is the only trust root. Decoding accepts the primary
//! secret plus any configured secondary verification secrets, so a secret can
//! be rotated without invalidating tokens signed under the previous one.

use anyhow::anyhow;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::Error;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: Vec<DecodingKey>,
    ttl_seconds: i64,
    validation: Validation,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &SecretString, secondary_secrets: &[String], ttl_seconds: i64) -> Self {
        let mut decoding = vec![DecodingKey::from_secret(secret.expose_secret().as_bytes())];
        decoding.extend(
            secondary_secrets
                .iter()
                .map(|extra| DecodingKey::from_secret(extra.as_bytes())),
        );

        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: a token must fail exactly at its expiry.
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding,
            ttl_seconds,
            validation,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue a token for `subject` with the service-configured TTL.
    ///
    /// # Errors
    /// `Internal` when signing fails.
    pub fn encode(&self, subject: &str) -> Result<String, Error> {
        self.encode_with_ttl(subject, self.ttl_seconds)
    }

    /// Issue a token with an explicit TTL (used by tests and short-lived
    /// delegations).
    ///
    /// # Errors
    /// `Internal` when signing fails.
    pub fn encode_with_ttl(&self, subject: &str, ttl_seconds: i64) -> Result<String, Error> {
        let now = now_unix_seconds();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| Error::internal(anyhow!("failed to sign session token: {err}")))
    }

    /// Decode and verify a token, returning its subject.
    ///
    /// # Errors
    /// `Unauthorized` for tampered signatures, structural malformation, or
    /// expiry. No other tokens are accepted.
    pub fn decode(&self, token: &str) -> Result<String, Error> {
        for key in &self.decoding {
            if let Ok(data) = decode::<Claims>(token, key, &self.validation) {
                return Ok(data.claims.sub);
            }
        }
        Err(Error::Unauthorized("invalid or expired token"))
    }
}

/// Unix seconds for token issuance and expiry.
fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec_with(secret: &str, secondary: &[String]) -> TokenCodec {
        TokenCodec::new(&SecretString::from(secret.to_string()), secondary, 3600)
    }

    #[test]
    fn encode_decode_round_trip() {
        let codec = codec_with("a-long-enough-test-secret-value", &[]);
        let token = codec.encode("actor-1").expect("encode");
        assert_eq!(codec.decode(&token).expect("decode"), "actor-1");
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let codec = codec_with("a-long-enough-test-secret-value", &[]);
        let token = codec.encode_with_ttl("actor-1", -5).expect("encode");
        assert!(matches!(
            codec.decode(&token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let signer = codec_with("secret-one-for-testing-purposes", &[]);
        let verifier = codec_with("secret-two-for-testing-purposes", &[]);
        let token = signer.encode("actor-1").expect("encode");
        assert!(matches!(
            verifier.decode(&token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn malformed_token_is_unauthorized() {
        let codec = codec_with("a-long-enough-test-secret-value", &[]);
        assert!(matches!(
            codec.decode("not.a.token"),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(codec.decode(""), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn secondary_secret_still_verifies() {
        let old = codec_with("previous-signing-secret-value!!", &[]);
        let token = old.encode("actor-1").expect("encode");

        let rotated = codec_with(
            "current-signing-secret-value!!!!",
            &["previous-signing-secret-value!!".to_string()],
        );
        assert_eq!(rotated.decode(&token).expect("decode"), "actor-1");
    }
}
