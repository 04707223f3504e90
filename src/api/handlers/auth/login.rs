//! Login, logout, and registration endpoints.
//!
//! Every failure surfaces as one of a few fixed messages. Which factor of a
//! credential check failed, or whether a username exists, never leaks here.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    audit,
    session::{
        Fingerprint, ResolveOutcome, clear_session_cookie, extract_session_id, session_cookie,
    },
    state::AuthState,
    storage::{
        PgCredentialStore, SignupOutcome, deactivate_session_record, insert_session_record,
        insert_user,
    },
    types::{ErrorResponse, LoginRequest, LoginResponse, RegisterRequest},
    utils::{extract_client_ip, extract_user_agent, normalize_email, valid_email, valid_username},
    verifier::{CredentialVerifier, VerifyOutcome, hash_password},
};

pub(super) const MSG_INVALID_CREDENTIALS: &str = "Invalid username or password";
pub(super) const MSG_SESSION_EXPIRED: &str = "Session expired, please sign in again";
pub(super) const MSG_CSRF_FAILED: &str = "Security check failed, please try again";
const MSG_INVALID_REGISTRATION: &str = "Invalid registration details";
const MSG_REGISTRATION_CONFLICT: &str = "Username or email already in use";

const MIN_PASSWORD_LENGTH: usize = 8;

pub(super) fn fingerprint_from(headers: &HeaderMap) -> Fingerprint {
    Fingerprint::new(extract_client_ip(headers), extract_user_agent(headers))
}

/// Build an error response that still refreshes the session cookie.
fn rejected(auth_state: &AuthState, session_id: &str, status: StatusCode, message: &str) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state.config(), session_id) {
        headers.insert(SET_COOKIE, cookie);
    }
    (status, headers, Json(ErrorResponse::new(message))).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials verified, session promoted", body = LoginResponse),
        (status = 401, description = "Invalid credentials or expired session", body = ErrorResponse),
        (status = 403, description = "CSRF validation failed", body = ErrorResponse),
        (status = 500, description = "Internal error")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<CredentialVerifier<PgCredentialStore>>>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let client_addr = extract_client_ip(&headers);
    let presented = extract_session_id(&headers);
    let resolution = match auth_state
        .sessions()
        .resolve(presented.as_deref(), fingerprint_from(&headers))
        .await
    {
        Ok(resolution) => resolution,
        Err(err) => {
            error!("Failed to resolve session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match resolution.outcome {
        ResolveOutcome::TimedOut => {
            audit::session_timed_out(
                client_addr.as_deref(),
                resolution.evicted.as_ref().map(|i| i.username.as_str()),
            );
            return rejected(
                &auth_state,
                resolution.session.id(),
                StatusCode::UNAUTHORIZED,
                MSG_SESSION_EXPIRED,
            );
        }
        ResolveOutcome::FingerprintMismatch => {
            // The fresh replacement session carries no token, so the CSRF
            // gate below rejects this request anyway.
            audit::fingerprint_mismatch(
                client_addr.as_deref(),
                resolution.evicted.as_ref().map(|i| i.username.as_str()),
            );
        }
        ResolveOutcome::Started | ResolveOutcome::Resumed => {}
    }

    // CSRF gate runs before credentials are even looked at.
    if !auth_state
        .csrf()
        .validate(resolution.session.id(), &payload.csrf_token)
        .await
    {
        audit::csrf_rejected(client_addr.as_deref(), "/v1/auth/login");
        return rejected(
            &auth_state,
            resolution.session.id(),
            StatusCode::FORBIDDEN,
            MSG_CSRF_FAILED,
        );
    }

    let identity = match verifier.verify(&payload.username, &payload.password).await {
        Ok(VerifyOutcome::Verified(identity)) => identity,
        Ok(VerifyOutcome::Rejected) => {
            audit::login_failed(client_addr.as_deref(), &payload.username);
            return rejected(
                &auth_state,
                resolution.session.id(),
                StatusCode::UNAUTHORIZED,
                MSG_INVALID_CREDENTIALS,
            );
        }
        Err(err) => {
            error!("Credential store failure: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let session = match auth_state
        .sessions()
        .promote(resolution.session.id(), identity.clone())
        .await
    {
        Ok(Some(session)) => session,
        Ok(None) => {
            // Session vanished between resolve and promote (racing destroy).
            return rejected(
                &auth_state,
                resolution.session.id(),
                StatusCode::UNAUTHORIZED,
                MSG_INVALID_CREDENTIALS,
            );
        }
        Err(err) => {
            error!("Failed to promote session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = insert_session_record(
        &pool,
        session.ledger_key(),
        identity.user_id,
        &session.fingerprint().digest(),
        auth_state.config().idle_timeout_seconds(),
    )
    .await
    {
        error!("Failed to record session in ledger: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    audit::login_succeeded(client_addr.as_deref(), &identity.username);

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state.config(), session.id()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = LoginResponse {
        user_id: identity.user_id.to_string(),
        username: identity.username,
        admin: identity.admin,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared"),
        (status = 403, description = "CSRF validation failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let client_addr = extract_client_ip(&headers);

    if let Some(session_id) = extract_session_id(&headers) {
        if let Some(session) = auth_state.sessions().peek(&session_id).await {
            // A live session is about to be destroyed, so the request must
            // prove it came from our own page.
            let token = headers
                .get("x-csrf-token")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("");
            if !auth_state.csrf().validate(&session_id, token).await {
                audit::csrf_rejected(client_addr.as_deref(), "/v1/auth/logout");
                return (
                    StatusCode::FORBIDDEN,
                    Json(ErrorResponse::new(MSG_CSRF_FAILED)),
                )
                    .into_response();
            }

            let identity = auth_state.sessions().destroy(&session_id).await;
            if let Some(identity) = identity {
                // Best effort: the in-memory session is already gone.
                if let Err(err) = deactivate_session_record(&pool, session.ledger_key()).await {
                    error!("Failed to deactivate session record: {err}");
                }
                audit::logout(client_addr.as_deref(), &identity.username);
            }
        }
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Invalid registration details", body = ErrorResponse),
        (status = 403, description = "CSRF validation failed", body = ErrorResponse),
        (status = 409, description = "Username or email already in use", body = ErrorResponse),
        (status = 500, description = "Internal error")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<RegisterRequest>,
) -> Response {
    let client_addr = extract_client_ip(&headers);
    let presented = extract_session_id(&headers);
    let resolution = match auth_state
        .sessions()
        .resolve(presented.as_deref(), fingerprint_from(&headers))
        .await
    {
        Ok(resolution) => resolution,
        Err(err) => {
            error!("Failed to resolve session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if resolution.outcome == ResolveOutcome::TimedOut {
        audit::session_timed_out(
            client_addr.as_deref(),
            resolution.evicted.as_ref().map(|i| i.username.as_str()),
        );
        return rejected(
            &auth_state,
            resolution.session.id(),
            StatusCode::UNAUTHORIZED,
            MSG_SESSION_EXPIRED,
        );
    }

    if !auth_state
        .csrf()
        .validate(resolution.session.id(), &payload.csrf_token)
        .await
    {
        audit::csrf_rejected(client_addr.as_deref(), "/v1/auth/register");
        return rejected(
            &auth_state,
            resolution.session.id(),
            StatusCode::FORBIDDEN,
            MSG_CSRF_FAILED,
        );
    }

    let email = normalize_email(&payload.email);
    if !valid_username(&payload.username)
        || !valid_email(&email)
        || payload.password.len() < MIN_PASSWORD_LENGTH
        || payload.password != payload.confirm_password
    {
        return rejected(
            &auth_state,
            resolution.session.id(),
            StatusCode::BAD_REQUEST,
            MSG_INVALID_REGISTRATION,
        );
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match insert_user(&pool, &payload.username, &email, &password_hash).await {
        Ok(SignupOutcome::Created) => {
            audit::registration(client_addr.as_deref(), &payload.username);
            let mut response_headers = HeaderMap::new();
            if let Ok(cookie) = session_cookie(auth_state.config(), resolution.session.id()) {
                response_headers.insert(SET_COOKIE, cookie);
            }
            (StatusCode::CREATED, response_headers).into_response()
        }
        Ok(SignupOutcome::Conflict) => rejected(
            &auth_state,
            resolution.session.id(),
            StatusCode::CONFLICT,
            MSG_REGISTRATION_CONFLICT,
        ),
        Err(err) => {
            error!("Failed to insert user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::*;
    use anyhow::{Context, Result};
    use axum::http::header::COOKIE;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    // Lazy pool: handlers under test reject before touching the database.
    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://gardi@localhost:5432/gardi")
            .expect("lazy pool")
    }

    fn test_state(config: AuthConfig) -> Arc<AuthState> {
        Arc::new(AuthState::new(config))
    }

    fn test_verifier(pool: &PgPool) -> Arc<CredentialVerifier<PgCredentialStore>> {
        Arc::new(
            CredentialVerifier::new(
                PgCredentialStore::new(pool.clone()),
                Duration::from_millis(0),
            )
            .expect("fallback hash"),
        )
    }

    fn browser_headers(session_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            "Chrome/120".parse().expect("header"),
        );
        if let Some(id) = session_id {
            headers.insert(
                COOKIE,
                format!("gardi_session={id}").parse().expect("header"),
            );
        }
        headers
    }

    #[tokio::test]
    async fn login_without_csrf_token_is_forbidden() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new());
        let verifier = test_verifier(&pool);

        let response = login(
            browser_headers(None),
            Extension(pool),
            Extension(state),
            Extension(verifier),
            Json(LoginRequest {
                username: "alice".to_string(),
                password: "hunter2hunter2".to_string(),
                csrf_token: String::new(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(SET_COOKIE));
        Ok(())
    }

    #[tokio::test]
    async fn login_with_wrong_csrf_token_is_forbidden() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new());
        let verifier = test_verifier(&pool);

        let resolution = state
            .sessions()
            .resolve(None, fingerprint_from(&browser_headers(None)))
            .await?;
        let _ = state.csrf().issue(resolution.session.id()).await?;

        let response = login(
            browser_headers(Some(resolution.session.id())),
            Extension(pool),
            Extension(state),
            Extension(verifier),
            Json(LoginRequest {
                username: "alice".to_string(),
                password: "hunter2hunter2".to_string(),
                csrf_token: "forged".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn login_on_expired_session_reports_timeout() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new().with_idle_timeout_seconds(0));
        let verifier = test_verifier(&pool);

        let resolution = state
            .sessions()
            .resolve(None, fingerprint_from(&browser_headers(None)))
            .await?;

        let response = login(
            browser_headers(Some(resolution.session.id())),
            Extension(pool),
            Extension(state),
            Extension(verifier),
            Json(LoginRequest {
                username: "alice".to_string(),
                password: "hunter2hunter2".to_string(),
                csrf_token: "anything".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn logout_without_session_clears_cookie() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new());

        let response = logout(browser_headers(None), Extension(pool), Extension(state)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .context("set-cookie")?;
        assert!(cookie.contains("Max-Age=0"));
        Ok(())
    }

    #[tokio::test]
    async fn logout_of_live_session_requires_csrf_token() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new());

        let resolution = state
            .sessions()
            .resolve(None, fingerprint_from(&browser_headers(None)))
            .await?;
        let _ = state.csrf().issue(resolution.session.id()).await?;

        let response = logout(
            browser_headers(Some(resolution.session.id())),
            Extension(pool),
            Extension(state),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_details_after_csrf() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new());

        let resolution = state
            .sessions()
            .resolve(None, fingerprint_from(&browser_headers(None)))
            .await?;
        let token = state
            .csrf()
            .issue(resolution.session.id())
            .await?
            .context("live")?;

        // Bad email, short password, and mismatched confirmation all map to
        // the same generic 400.
        let bad_payloads = [
            ("alice", "not-an-email", "longenough", "longenough"),
            ("alice", "a@example.com", "short", "short"),
            ("alice", "a@example.com", "longenough", "different"),
            ("a", "a@example.com", "longenough", "longenough"),
        ];
        for (username, email, password, confirm) in bad_payloads {
            let response = register(
                browser_headers(Some(resolution.session.id())),
                Extension(pool.clone()),
                Extension(state.clone()),
                Json(RegisterRequest {
                    username: username.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    confirm_password: confirm.to_string(),
                    csrf_token: token.clone(),
                }),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        Ok(())
    }

    #[tokio::test]
    async fn register_on_expired_session_reports_timeout() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new().with_idle_timeout_seconds(0));

        let resolution = state
            .sessions()
            .resolve(None, fingerprint_from(&browser_headers(None)))
            .await?;

        let response = register(
            browser_headers(Some(resolution.session.id())),
            Extension(pool),
            Extension(state),
            Json(RegisterRequest {
                username: "alice".to_string(),
                email: "a@example.com".to_string(),
                password: "longenough".to_string(),
                confirm_password: "longenough".to_string(),
                csrf_token: "anything".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn register_without_csrf_token_is_forbidden() -> Result<()> {
        let pool = lazy_pool();
        let state = test_state(AuthConfig::new());

        let response = register(
            browser_headers(None),
            Extension(pool),
            Extension(state),
            Json(RegisterRequest {
                username: "alice".to_string(),
                email: "a@example.com".to_string(),
                password: "longenough".to_string(),
                confirm_password: "longenough".to_string(),
                csrf_token: String::new(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }
}
