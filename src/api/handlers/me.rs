//! Authenticated self-service endpoint.
//!
//! Flow overview:
//! 1) Authenticate via session cookie and the session ledger.
//! 2) Return the principal attached to the session.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use super::auth::AuthState;
use super::auth::principal::require_auth;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: String,
    pub username: String,
    pub admin: bool,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user.", body = MeResponse),
        (status = 401, description = "Missing, anonymous, or revoked session."),
    ),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let response = MeResponse {
        user_id: principal.user_id.to_string(),
        username: principal.username,
        admin: principal.admin,
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::auth::AuthConfig;
    use super::*;
    use anyhow::Result;
    use axum::response::Response;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn get_me_without_session_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://gardi@localhost:5432/gardi")?;
        let state = Arc::new(AuthState::new(AuthConfig::new()));
        let response: Response = get_me(HeaderMap::new(), Extension(pool), Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
