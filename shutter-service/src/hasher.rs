//! Credential hashing seam.
//!
//! Hashing is the slow half of registration and runs as a coordinated task,
//! so implementations receive the task's [`TaskContext`] and must stop
//! promptly once the run is cancelled.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use shutter_core::{AuthError, ShutterError, ShutterResult, ValidationError};
use shutter_exec::TaskContext;

/// Turns a plaintext password into a storable credential.
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    /// Hash `password`, checking `ctx` for cancellation along the way.
    async fn hash(&self, password: &str, ctx: &TaskContext) -> ShutterResult<String>;

    /// Whether `password` matches a credential produced by [`hash`](Self::hash).
    ///
    /// # Errors
    ///
    /// `AuthError::Hashing` if `encoded` is not a credential this hasher can read.
    async fn verify(&self, password: &str, encoded: &str) -> ShutterResult<bool>;
}

fn hashing_error(reason: impl Into<String>) -> ShutterError {
    AuthError::Hashing {
        reason: reason.into(),
    }
    .into()
}

/// Argon2id with a random salt per credential, stored as a PHC string
/// (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`).
///
/// The work runs on the blocking pool. Cancellation is observed before the
/// work starts and while waiting for it; a hash already in progress finishes
/// on its thread and its result is dropped.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// A hasher with explicit cost parameters.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidValue` if argon2 rejects the combination,
    /// e.g. memory below 8 KiB per lane or zero iterations.
    pub fn with_params(memory_kib: u32, iterations: u32, lanes: u32) -> ShutterResult<Self> {
        let params = Params::new(memory_kib, iterations, lanes, None).map_err(|e| {
            ValidationError::InvalidValue {
                field: "argon2_params".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

#[async_trait]
impl CredentialHasher for Argon2Hasher {
    async fn hash(&self, password: &str, ctx: &TaskContext) -> ShutterResult<String> {
        ctx.checkpoint()?;

        let argon2 = self.argon2();
        let password = password.to_owned();
        let job = tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        });

        let encoded = ctx
            .guard(async move {
                job.await
                    .map_err(|e| hashing_error(format!("hashing task failed: {e}")))?
                    .map_err(|e| hashing_error(e.to_string()))
            })
            .await?;
        ctx.checkpoint()?;
        Ok(encoded)
    }

    async fn verify(&self, password: &str, encoded: &str) -> ShutterResult<bool> {
        let argon2 = self.argon2();
        let password = password.to_owned();
        let encoded = encoded.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&encoded)?;
            Ok::<_, argon2::password_hash::Error>(
                argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            )
        })
        .await
        .map_err(|e| hashing_error(format!("verification task failed: {e}")))?
        .map_err(|e| hashing_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_exec::CancellationToken;

    fn fast() -> Argon2Hasher {
        Argon2Hasher::with_params(8 * 1024, 1, 1).unwrap()
    }

    fn ctx() -> TaskContext {
        TaskContext::detached(CancellationToken::new())
    }

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hasher = fast();
        let encoded = hasher.hash("hunter22", &ctx()).await.unwrap();

        assert!(encoded.starts_with("$argon2id$"), "got {encoded}");
        assert!(hasher.verify("hunter22", &encoded).await.unwrap());
        assert!(!hasher.verify("hunter23", &encoded).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let hasher = fast();
        let a = hasher.hash("same", &ctx()).await.unwrap();
        let b = hasher.hash("same", &ctx()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_verify_reads_cost_from_the_credential() {
        let encoded = fast().hash("secret1", &ctx()).await.unwrap();
        // A hasher configured with other costs still verifies it.
        let other = Argon2Hasher::with_params(16 * 1024, 2, 1).unwrap();
        assert!(other.verify("secret1", &encoded).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_hash_stops() {
        let token = CancellationToken::new();
        token.cancel();
        let err = fast()
            .hash("secret", &TaskContext::detached(token))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_cancellation_while_hashing_returns_promptly() {
        // Expensive enough to still be running when the token fires.
        let slow = Argon2Hasher::with_params(64 * 1024, 8, 1).unwrap();
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                token.cancel();
            })
        };

        let err = slow
            .hash("secret", &TaskContext::detached(token))
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_malformed_credentials_are_errors() {
        let hasher = fast();
        for encoded in ["", "sha256i$1$00$00", "$argon2id$garbage"] {
            let err = hasher.verify("x", encoded).await.unwrap_err();
            assert!(matches!(err, ShutterError::Auth(AuthError::Hashing { .. })), "{encoded}");
        }
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(Argon2Hasher::with_params(8 * 1024, 0, 1).is_err());
        assert!(Argon2Hasher::with_params(1, 1, 1).is_err());
        assert_eq!(Argon2Hasher::default().params(), &Params::default());
    }
}
