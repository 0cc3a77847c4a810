//! One-way password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

use devbook_core::PasswordDigest;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub trait Credentials: Send + Sync {
    /// Hash a plaintext password. Each call uses a fresh random salt.
    fn hash(&self, plaintext: &str) -> Result<PasswordDigest, CredentialError>;

    /// `true` iff `candidate` matches `digest`. Unparsable digests never match.
    fn verify(&self, digest: &PasswordDigest, candidate: &str) -> bool;
}

/// Argon2id with a salted PHC-format digest.
#[derive(Debug, Clone)]
pub struct Argon2Credentials {
    params: Params,
}

impl Argon2Credentials {
    pub fn new() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }

    /// Custom memory (KiB) / iteration cost. Low values are for tests only.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self, CredentialError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| CredentialError::Hash(e.to_string()))?;
        Ok(Self { params })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Credentials {
    fn default() -> Self {
        Self::new()
    }
}

impl Credentials for Argon2Credentials {
    fn hash(&self, plaintext: &str) -> Result<PasswordDigest, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hash(e.to_string()))?;
        Ok(PasswordDigest::new(hash.to_string()))
    }

    fn verify(&self, digest: &PasswordDigest, candidate: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest.as_str()) else {
            return false;
        };
        self.hasher()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }
}
