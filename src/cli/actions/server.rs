use crate::api;
use crate::api::handlers::auth::AuthConfig;
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub idle_timeout_seconds: u64,
    pub rotation_interval_seconds: u64,
    pub csrf_ttl_seconds: u64,
    pub login_failure_delay_ms: u64,
    pub bind_client_addr: bool,
    pub insecure_cookies: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new()
        .with_idle_timeout_seconds(args.idle_timeout_seconds)
        .with_rotation_interval_seconds(args.rotation_interval_seconds)
        .with_csrf_ttl_seconds(args.csrf_ttl_seconds)
        .with_login_failure_delay_ms(args.login_failure_delay_ms)
        .with_bind_client_addr(args.bind_client_addr)
        .with_secure_cookies(!args.insecure_cookies);

    api::new(args.port, args.dsn, auth_config).await
}
