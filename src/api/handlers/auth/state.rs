//! Auth configuration and shared state.

use std::sync::Arc;
use std::time::Duration;

use super::csrf::CsrfManager;
use super::session::{SessionManager, SessionStore};

const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 30 * 60;
const DEFAULT_ROTATION_INTERVAL_SECONDS: u64 = 5 * 60;
const DEFAULT_CSRF_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_LOGIN_FAILURE_DELAY_MS: u64 = 2000;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    idle_timeout_seconds: u64,
    rotation_interval_seconds: u64,
    csrf_ttl_seconds: u64,
    login_failure_delay_ms: u64,
    bind_client_addr: bool,
    secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT_SECONDS,
            rotation_interval_seconds: DEFAULT_ROTATION_INTERVAL_SECONDS,
            csrf_ttl_seconds: DEFAULT_CSRF_TTL_SECONDS,
            login_failure_delay_ms: DEFAULT_LOGIN_FAILURE_DELAY_MS,
            bind_client_addr: false,
            secure_cookies: true,
        }
    }

    #[must_use]
    pub fn with_idle_timeout_seconds(mut self, seconds: u64) -> Self {
        self.idle_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rotation_interval_seconds(mut self, seconds: u64) -> Self {
        self.rotation_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_csrf_ttl_seconds(mut self, seconds: u64) -> Self {
        self.csrf_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_failure_delay_ms(mut self, millis: u64) -> Self {
        self.login_failure_delay_ms = millis;
        self
    }

    /// Also bind sessions to the client address, not just the user agent.
    /// Off by default: proxies and mobile networks change addresses mid-session.
    #[must_use]
    pub fn with_bind_client_addr(mut self, bind: bool) -> Self {
        self.bind_client_addr = bind;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn idle_timeout_seconds(&self) -> u64 {
        self.idle_timeout_seconds
    }

    pub(super) fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub(super) fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_seconds)
    }

    pub(super) fn csrf_ttl(&self) -> Duration {
        Duration::from_secs(self.csrf_ttl_seconds)
    }

    pub(crate) fn login_failure_delay(&self) -> Duration {
        Duration::from_millis(self.login_failure_delay_ms)
    }

    pub(super) fn bind_client_addr(&self) -> bool {
        self.bind_client_addr
    }

    pub(super) fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

/// Shared auth state: one session store behind the lifecycle and CSRF managers.
pub struct AuthState {
    config: AuthConfig,
    sessions: SessionManager,
    csrf: CsrfManager,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let store = Arc::new(SessionStore::new());
        let sessions = SessionManager::new(Arc::clone(&store), &config);
        let csrf = CsrfManager::new(store, &config);
        Self {
            config,
            sessions,
            csrf,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfManager {
        &self.csrf
    }
}
