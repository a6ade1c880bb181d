//! Credential hashing
//!
//! Passwords are stored as salted Argon2id PHC strings. Hashing is CPU
//! bound, so both operations run on the blocking thread pool.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::HashingConfig;

/// Hashing failed for a reason unrelated to the password itself
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hashing parameters: {0}")]
    Params(String),

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Hashing task failed: {0}")]
    Task(String),
}

/// One-way password hashing
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    /// Produce a salted digest of `plaintext`
    async fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// Check `plaintext` against `digest`; a mismatch or an unparsable
    /// digest is `false`, never an error
    async fn compare(&self, plaintext: &str, digest: &str) -> bool;
}

/// Argon2id hasher with fixed cost parameters
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(config: &HashingConfig) -> Result<Self, HashError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| HashError::Params(e.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

#[async_trait]
impl CredentialHasher for Argon2Hasher {
    async fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let argon2 = self.argon2();
        let plaintext = plaintext.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut rand::thread_rng());
            argon2
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| HashError::Hash(e.to_string()))
        })
        .await
        .map_err(|e| HashError::Task(e.to_string()))?
    }

    async fn compare(&self, plaintext: &str, digest: &str) -> bool {
        let argon2 = self.argon2();
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();

        let outcome = tokio::task::spawn_blocking(move || {
            // Parameters come from the digest itself, so hashes made with an
            // older cost still verify.
            match PasswordHash::new(&digest) {
                Ok(parsed) => argon2
                    .verify_password(plaintext.as_bytes(), &parsed)
                    .is_ok(),
                Err(e) => {
                    warn!("Stored password hash is not a valid PHC string: {}", e);
                    false
                }
            }
        })
        .await;

        outcome.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> Argon2Hasher {
        Argon2Hasher::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn hash_then_compare() {
        let hasher = cheap_hasher();
        let digest = hasher.hash("Str0ng!Pass").await.unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.compare("Str0ng!Pass", &digest).await);
        assert!(!hasher.compare("wrong", &digest).await);
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let hasher = cheap_hasher();
        let first = hasher.hash("Str0ng!Pass").await.unwrap();
        let second = hasher.hash("Str0ng!Pass").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn compare_with_garbage_digest_is_false() {
        let hasher = cheap_hasher();
        assert!(!hasher.compare("anything", "not-a-phc-string").await);
    }

    #[test]
    fn rejects_impossible_cost() {
        let result = Argon2Hasher::new(&HashingConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(result, Err(HashError::Params(_))));
    }
}
