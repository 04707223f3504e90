//! Session-scoped CSRF tokens: stable issuance, fail-closed validation.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

use super::session::{IssuedCsrf, SessionStore};
use super::state::AuthConfig;
use super::utils::generate_csrf_token;

pub struct CsrfManager {
    store: Arc<SessionStore>,
    ttl: Duration,
}

impl CsrfManager {
    pub(super) fn new(store: Arc<SessionStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            ttl: config.csrf_ttl(),
        }
    }

    /// Return the token bound to a session, minting one if absent or expired.
    ///
    /// Issuance is stable: repeated calls within the expiry window return the
    /// same value, so several forms on one page all carry a valid token.
    /// Returns `None` when the session is not live.
    ///
    /// # Errors
    /// Returns an error only if the OS CSPRNG fails to produce a token.
    pub async fn issue(&self, session_id: &str) -> Result<Option<String>> {
        let mut entries = self.store.entries.lock().await;
        let Some(session) = entries.get_mut(session_id) else {
            return Ok(None);
        };
        if let Some(csrf) = &session.csrf {
            if csrf.issued_at.elapsed() < self.ttl {
                return Ok(Some(csrf.value.clone()));
            }
        }
        let value = generate_csrf_token()?;
        session.csrf = Some(IssuedCsrf {
            value: value.clone(),
            issued_at: Instant::now(),
        });
        Ok(Some(value))
    }

    /// Validate a submitted token against the one bound to the session.
    ///
    /// Fails closed: an unknown session, a session without a token, an empty
    /// submission, or an expired token all reject. The comparison itself runs
    /// in constant time. Validation does not consume the token.
    pub async fn validate(&self, session_id: &str, submitted: &str) -> bool {
        if submitted.is_empty() {
            return false;
        }
        let entries = self.store.entries.lock().await;
        let Some(session) = entries.get(session_id) else {
            return false;
        };
        let Some(csrf) = &session.csrf else {
            return false;
        };
        if csrf.issued_at.elapsed() >= self.ttl {
            return false;
        }
        csrf.value.as_bytes().ct_eq(submitted.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::super::session::{Fingerprint, Identity};
    use super::super::state::{AuthConfig, AuthState};
    use anyhow::{Context, Result};
    use uuid::Uuid;

    fn chrome() -> Fingerprint {
        Fingerprint::new(Some("1.2.3.4".to_string()), Some("Chrome/120".to_string()))
    }

    async fn live_session_id(state: &AuthState) -> Result<String> {
        let resolution = state.sessions().resolve(None, chrome()).await?;
        Ok(resolution.session.id().to_string())
    }

    #[tokio::test]
    async fn issue_is_stable_within_expiry_window() -> Result<()> {
        let state = AuthState::new(AuthConfig::new());
        let session_id = live_session_id(&state).await?;

        let first = state.csrf().issue(&session_id).await?.context("live")?;
        let second = state.csrf().issue(&session_id).await?.context("live")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn issue_returns_none_for_unknown_session() -> Result<()> {
        let state = AuthState::new(AuthConfig::new());
        assert!(state.csrf().issue("unknown").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn validate_accepts_issued_token_and_does_not_consume_it() -> Result<()> {
        let state = AuthState::new(AuthConfig::new());
        let session_id = live_session_id(&state).await?;
        let token = state.csrf().issue(&session_id).await?.context("live")?;

        assert!(state.csrf().validate(&session_id, &token).await);
        // A second form submission with the same token still passes.
        assert!(state.csrf().validate(&session_id, &token).await);
        Ok(())
    }

    #[tokio::test]
    async fn validate_fails_closed() -> Result<()> {
        let state = AuthState::new(AuthConfig::new());
        let session_id = live_session_id(&state).await?;

        // No token issued yet.
        assert!(!state.csrf().validate(&session_id, "anything").await);

        let token = state.csrf().issue(&session_id).await?.context("live")?;
        assert!(!state.csrf().validate(&session_id, "").await);
        assert!(!state.csrf().validate(&session_id, "wrong-token").await);
        assert!(!state.csrf().validate("unknown-session", &token).await);
        Ok(())
    }

    #[tokio::test]
    async fn token_is_scoped_to_its_session() -> Result<()> {
        let state = AuthState::new(AuthConfig::new());
        let first = live_session_id(&state).await?;
        let second = live_session_id(&state).await?;

        let token = state.csrf().issue(&first).await?.context("live")?;
        let _ = state.csrf().issue(&second).await?.context("live")?;
        assert!(!state.csrf().validate(&second, &token).await);
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_rejects_and_reissues() -> Result<()> {
        let state = AuthState::new(AuthConfig::new().with_csrf_ttl_seconds(0));
        let session_id = live_session_id(&state).await?;

        let first = state.csrf().issue(&session_id).await?.context("live")?;
        assert!(!state.csrf().validate(&session_id, &first).await);

        // Next issuance mints a fresh token instead of returning the stale one.
        let second = state.csrf().issue(&session_id).await?.context("live")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn token_survives_scheduled_rotation() -> Result<()> {
        let state = AuthState::new(AuthConfig::new().with_rotation_interval_seconds(0));
        let session_id = live_session_id(&state).await?;
        let token = state.csrf().issue(&session_id).await?.context("live")?;

        let rotated = state
            .sessions()
            .resolve(Some(&session_id), chrome())
            .await?;
        assert!(rotated.rotated);
        assert!(state.csrf().validate(rotated.session.id(), &token).await);
        // The retired identifier no longer validates anything.
        assert!(!state.csrf().validate(&session_id, &token).await);
        Ok(())
    }

    #[tokio::test]
    async fn promotion_drops_pre_login_token() -> Result<()> {
        let state = AuthState::new(AuthConfig::new());
        let session_id = live_session_id(&state).await?;
        let token = state.csrf().issue(&session_id).await?.context("live")?;

        let promoted = state
            .sessions()
            .promote(
                &session_id,
                Identity {
                    user_id: Uuid::new_v4(),
                    username: "alice".to_string(),
                    admin: false,
                },
            )
            .await?
            .context("live")?;

        assert!(!state.csrf().validate(promoted.id(), &token).await);
        let fresh = state.csrf().issue(promoted.id()).await?.context("live")?;
        assert_ne!(fresh, token);
        Ok(())
    }
}
