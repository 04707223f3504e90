//! Credential verification with a uniform failure path.
//!
//! Unknown username and wrong password are indistinguishable to the caller:
//! same outcome, same minimum latency. Unknown usernames burn a real Argon2id
//! verification against a fallback hash so the two branches cost the same.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::session::Identity;
use super::utils::{generate_csrf_token, valid_username};

/// Stored credential row, as the store returns it.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub admin: bool,
}

/// Outcome of a credential check. `Rejected` carries no reason on purpose.
#[derive(Debug)]
pub enum VerifyOutcome {
    Verified(Identity),
    Rejected,
}

/// Seam between the verifier and whatever holds the credentials.
pub trait CredentialStore: Send + Sync {
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserRecord>>> + Send;

    fn record_login(&self, user_id: Uuid) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub struct CredentialVerifier<S: CredentialStore> {
    store: S,
    min_failure_latency: Duration,
    fallback_hash: String,
}

impl<S: CredentialStore> CredentialVerifier<S> {
    /// # Errors
    /// Returns an error if the fallback hash cannot be computed.
    pub fn new(store: S, min_failure_latency: Duration) -> Result<Self> {
        // Hash a random value nobody knows; verifying against it always fails
        // but costs the same as verifying a real credential.
        let fallback_hash = hash_password(&generate_csrf_token()?)?;
        Ok(Self {
            store,
            min_failure_latency,
            fallback_hash,
        })
    }

    /// Check a username/password pair against the store.
    ///
    /// Input that fails the username allow-list never reaches the store.
    /// Every rejection, whatever the cause, takes at least the configured
    /// minimum latency.
    ///
    /// # Errors
    /// Returns an error only for store failures; bad credentials are `Rejected`.
    pub async fn verify(&self, username: &str, password: &str) -> Result<VerifyOutcome> {
        let started = Instant::now();

        if !valid_username(username) || password.is_empty() {
            return self.reject(started).await;
        }

        match self.store.find_by_username(username).await? {
            Some(user) => {
                if verify_password(password, &user.password_hash)? {
                    self.store.record_login(user.user_id).await?;
                    Ok(VerifyOutcome::Verified(Identity {
                        user_id: user.user_id,
                        username: user.username,
                        admin: user.admin,
                    }))
                } else {
                    self.reject(started).await
                }
            }
            None => {
                // Burn the same work a real verification would.
                let _ = verify_password(password, &self.fallback_hash);
                self.reject(started).await
            }
        }
    }

    async fn reject(&self, started: Instant) -> Result<VerifyOutcome> {
        let remaining = self.min_failure_latency.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
        Ok(VerifyOutcome::Rejected)
    }
}

/// Hash a password with Argon2id in PHC string format.
///
/// # Errors
/// Returns an error if hashing fails.
pub(super) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only for a malformed hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|err| anyhow!("invalid password hash format: {err}"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(anyhow!("password verification error: {err}")),
    }
}
