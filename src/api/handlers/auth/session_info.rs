//! Session status endpoint: the page bootstrap call.
//!
//! Resolving here refreshes the cookie, reports authentication state, and
//! hands out the CSRF token forms must carry.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{
    audit,
    login::fingerprint_from,
    session::{ResolveOutcome, extract_session_id, session_cookie},
    state::AuthState,
    types::SessionStatusResponse,
    utils::extract_client_ip,
};

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Current session state", body = SessionStatusResponse),
        (status = 500, description = "Internal error")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
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
        ResolveOutcome::TimedOut => audit::session_timed_out(
            client_addr.as_deref(),
            resolution.evicted.as_ref().map(|i| i.username.as_str()),
        ),
        ResolveOutcome::FingerprintMismatch => audit::fingerprint_mismatch(
            client_addr.as_deref(),
            resolution.evicted.as_ref().map(|i| i.username.as_str()),
        ),
        ResolveOutcome::Started | ResolveOutcome::Resumed => {}
    }

    let csrf_token = match auth_state.csrf().issue(resolution.session.id()).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            // Destroyed between resolve and issue; the client can retry.
            error!("Session vanished before CSRF issuance");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(err) => {
            error!("Failed to issue CSRF token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state.config(), resolution.session.id()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = SessionStatusResponse {
        authenticated: resolution.session.is_authenticated(),
        username: resolution
            .session
            .identity()
            .map(|identity| identity.username.clone()),
        csrf_token,
        timed_out: resolution.outcome == ResolveOutcome::TimedOut,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::*;
    use anyhow::{Context, Result};
    use axum::body::to_bytes;
    use axum::http::header::COOKIE;

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

    async fn body_json(response: Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn first_contact_starts_anonymous_session_with_token() -> Result<()> {
        let state = Arc::new(AuthState::new(AuthConfig::new()));
        let response = session(browser_headers(None), Extension(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .context("set-cookie")?
            .to_string();
        assert!(cookie.starts_with("gardi_session="));

        let body = body_json(response).await?;
        assert_eq!(body["authenticated"], false);
        assert_eq!(body["timed_out"], false);
        assert!(!body["csrf_token"].as_str().context("token")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn repeated_calls_return_the_same_token() -> Result<()> {
        let state = Arc::new(AuthState::new(AuthConfig::new()));
        let first = session(browser_headers(None), Extension(state.clone())).await;
        let session_id = first
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|cookie| cookie.split(';').next())
            .and_then(|pair| pair.strip_prefix("gardi_session="))
            .context("cookie")?
            .to_string();
        let first_token = body_json(first).await?["csrf_token"]
            .as_str()
            .context("token")?
            .to_string();

        let second = session(browser_headers(Some(&session_id)), Extension(state)).await;
        let second_token = body_json(second).await?["csrf_token"]
            .as_str()
            .context("token")?
            .to_string();
        assert_eq!(first_token, second_token);
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_reports_timed_out() -> Result<()> {
        let state = Arc::new(AuthState::new(AuthConfig::new().with_idle_timeout_seconds(0)));
        let resolution = state
            .sessions()
            .resolve(None, fingerprint_from(&browser_headers(None)))
            .await?;

        let response = session(
            browser_headers(Some(resolution.session.id())),
            Extension(state),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body["timed_out"], true);
        assert_eq!(body["authenticated"], false);
        Ok(())
    }
}
