//! One-way password hashing (Argon2id).
//!
//! Each digest embeds its own random salt and parameters, so verification
//! works across work-factor changes. Comparison runs in constant time inside
//! the `argon2` crate.

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::Error;

/// Defaults calibrated to roughly 100ms+ on commodity server hardware.
pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 3;
pub const DEFAULT_PARALLELISM: u32 = 1;

pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Build a hasher with an explicit work factor.
    ///
    /// # Errors
    /// `Internal` when the parameters are outside Argon2 bounds.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, Error> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| Error::internal(anyhow!("invalid argon2 parameters: {err}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext with a fresh random salt.
    ///
    /// # Errors
    /// `Internal` when hashing fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|digest| digest.to_string())
            .map_err(|err| Error::internal(anyhow!("password hashing failed: {err}")))
    }

    /// Verify a plaintext against a stored digest.
    ///
    /// # Errors
    /// `Internal` only when the digest itself is malformed; a mismatching
    /// password is `Ok(false)`.
    pub fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, Error> {
        let parsed = PasswordHash::new(digest)
            .map_err(|err| Error::internal(anyhow!("malformed password digest: {err}")))?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(Error::internal(anyhow!("password verify failed: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal work factor keeps the test suite fast.
    fn test_hasher() -> PasswordHasher {
        PasswordHasher::new(1024, 1, 1).expect("valid parameters")
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let hasher = test_hasher();
        let digest = hasher.hash("p@ss").expect("hash");
        assert!(hasher.verify("p@ss", &digest).expect("verify"));
        assert!(!hasher.verify("wrong", &digest).expect("verify"));
    }

    #[test]
    fn same_password_hashes_differently() {
        let hasher = test_hasher();
        let first = hasher.hash("p@ss").expect("hash");
        let second = hasher.hash("p@ss").expect("hash");
        assert_ne!(first, second, "salts must differ");
    }

    #[test]
    fn malformed_digest_is_internal_error() {
        let hasher = test_hasher();
        let result = hasher.verify("p@ss", "not-a-digest");
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(PasswordHasher::new(0, 0, 0).is_err());
    }
}
