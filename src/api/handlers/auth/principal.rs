//! Authenticated principal extraction.
//!
//! Flow overview: read the session cookie, check the in-memory session, then
//! consult the ledger so sessions revoked out of band stop working even while
//! still live in memory.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;

use super::audit;
use super::login::fingerprint_from;
use super::session::extract_session_id;
use super::state::AuthState;
use super::storage::session_record_active;
use super::utils::extract_client_ip;

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub admin: bool,
}

/// Resolve the session cookie into a principal, or return 401.
///
/// Anything ambiguous resolves to 401; only a ledger failure surfaces as 500.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, StatusCode> {
    let Some(session_id) = extract_session_id(headers) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let Some(session) = auth_state.sessions().peek(&session_id).await else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !session
        .fingerprint()
        .matches(&fingerprint_from(headers), auth_state.config().bind_client_addr())
    {
        audit::fingerprint_mismatch(
            extract_client_ip(headers).as_deref(),
            session.identity().map(|i| i.username.as_str()),
        );
        auth_state.sessions().destroy(&session_id).await;
        return Err(StatusCode::UNAUTHORIZED);
    }

    let Some(identity) = session.identity() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    match session_record_active(pool, session.ledger_key()).await {
        Ok(true) => {
            // Protected endpoints count as activity too.
            auth_state.sessions().touch(&session_id).await;
            Ok(Principal {
                user_id: identity.user_id,
                username: identity.username.clone(),
                admin: identity.admin,
            })
        }
        Ok(false) => {
            // Revoked in the ledger; drop the in-memory session too.
            auth_state.sessions().destroy(&session_id).await;
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(err) => {
            error!("Failed to check session ledger: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
