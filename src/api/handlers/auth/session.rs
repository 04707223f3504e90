//! Session lifecycle: creation, validation, rotation, promotion, destruction.
//!
//! Sessions live in one in-process store behind a mutex, so every
//! read-modify-write on a session is atomic with respect to concurrent
//! requests presenting the same identifier. Identifiers presented by clients
//! are never trusted: anything unknown, expired, or bound to a different
//! client yields a fresh anonymous session.

use anyhow::Result;
use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::{generate_session_id, hash_session_id};

pub(crate) const SESSION_COOKIE_NAME: &str = "gardi_session";

/// Authenticated user attached to a session after promotion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub admin: bool,
}

/// Client characteristics a session is bound to at creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fingerprint {
    client_addr: Option<String>,
    user_agent: Option<String>,
}

impl Fingerprint {
    #[must_use]
    pub fn new(client_addr: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            client_addr,
            user_agent,
        }
    }

    /// Compare against the fingerprint captured at session creation.
    ///
    /// The user agent is always compared; the client address only when the
    /// deployment opted in via `with_bind_client_addr`.
    pub(super) fn matches(&self, presented: &Self, bind_client_addr: bool) -> bool {
        if self.user_agent != presented.user_agent {
            return false;
        }
        if bind_client_addr && self.client_addr != presented.client_addr {
            return false;
        }
        true
    }

    /// Digest stored in the session ledger instead of the raw components.
    pub(crate) fn digest(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.client_addr.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\n");
        hasher.update(self.user_agent.as_deref().unwrap_or("").as_bytes());
        hasher.finalize().to_vec()
    }
}

/// CSRF token currently bound to a session.
#[derive(Clone, Debug)]
pub(super) struct IssuedCsrf {
    pub(super) value: String,
    pub(super) issued_at: Instant,
}

/// One tracked session. Anonymous until promoted.
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    ledger_key: Vec<u8>,
    identity: Option<Identity>,
    fingerprint: Fingerprint,
    created_at: Instant,
    last_seen_at: Instant,
    rotated_at: Instant,
    pub(super) csrf: Option<IssuedCsrf>,
}

impl Session {
    fn anonymous(fingerprint: Fingerprint) -> Result<Self> {
        let now = Instant::now();
        let id = generate_session_id()?;
        Ok(Self {
            ledger_key: hash_session_id(&id),
            id,
            identity: None,
            fingerprint,
            created_at: now,
            last_seen_at: now,
            rotated_at: now,
            csrf: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Key of this session's ledger row. Rotation changes the transport
    /// identifier but not this key; promotion re-keys it.
    pub(crate) fn ledger_key(&self) -> &[u8] {
        &self.ledger_key
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Outcome of resolving a presented identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// No usable identifier was presented; a fresh anonymous session started.
    Started,
    /// The presented identifier matched a live session.
    Resumed,
    /// The session sat idle past the timeout and was destroyed.
    TimedOut,
    /// The presented identifier belonged to a different client.
    FingerprintMismatch,
}

/// A resolved session plus what happened on the way.
#[derive(Debug)]
pub struct Resolution {
    pub session: Session,
    pub outcome: ResolveOutcome,
    /// The identifier changed during this resolve (scheduled rotation).
    pub rotated: bool,
    /// Identity of a session destroyed during this resolve, for audit.
    pub evicted: Option<Identity>,
}

/// In-process session store shared by the lifecycle and CSRF managers.
pub struct SessionStore {
    pub(super) entries: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub(super) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

pub struct SessionManager {
    store: Arc<SessionStore>,
    idle_timeout: Duration,
    rotation_interval: Duration,
    bind_client_addr: bool,
}

impl SessionManager {
    pub(super) fn new(store: Arc<SessionStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            idle_timeout: config.idle_timeout(),
            rotation_interval: config.rotation_interval(),
            bind_client_addr: config.bind_client_addr(),
        }
    }

    /// Resolve a presented identifier into a live session.
    ///
    /// Handles the full per-request lifecycle under one lock: idle expiry,
    /// fingerprint validation, activity refresh, and scheduled identifier
    /// rotation. The returned session is always live and stored.
    ///
    /// # Errors
    /// Returns an error only if the OS CSPRNG fails to produce an identifier.
    pub async fn resolve(
        &self,
        presented: Option<&str>,
        fingerprint: Fingerprint,
    ) -> Result<Resolution> {
        let now = Instant::now();
        let mut entries = self.store.entries.lock().await;

        // Take the presented session out of the map first so expiry and
        // mismatch are observable outcomes, then prune the rest lazily.
        let existing = presented.and_then(|id| entries.remove(id));
        let idle_timeout = self.idle_timeout;
        entries.retain(|_, session| now.duration_since(session.last_seen_at) < idle_timeout);

        let (session, outcome, rotated, evicted) = match existing {
            None => (
                Session::anonymous(fingerprint)?,
                ResolveOutcome::Started,
                false,
                None,
            ),
            Some(session) if now.duration_since(session.last_seen_at) >= self.idle_timeout => (
                Session::anonymous(fingerprint)?,
                ResolveOutcome::TimedOut,
                false,
                session.identity,
            ),
            Some(session) if !session.fingerprint.matches(&fingerprint, self.bind_client_addr) => {
                (
                    Session::anonymous(fingerprint)?,
                    ResolveOutcome::FingerprintMismatch,
                    false,
                    session.identity,
                )
            }
            Some(mut session) => {
                session.last_seen_at = now;
                let rotated = if now.duration_since(session.rotated_at) >= self.rotation_interval {
                    // All fields migrate, the CSRF token and ledger key
                    // included, so in-flight forms still submit and the
                    // ledger row written at login stays reachable. The old
                    // identifier is already gone from the map.
                    session.id = generate_session_id()?;
                    session.rotated_at = now;
                    true
                } else {
                    false
                };
                (session, ResolveOutcome::Resumed, rotated, None)
            }
        };

        entries.insert(session.id.clone(), session.clone());
        Ok(Resolution {
            session,
            outcome,
            rotated,
            evicted,
        })
    }

    /// Attach an identity to a session, defeating fixation.
    ///
    /// A new identifier is generated before the identity attaches, the
    /// activity and rotation clocks reset, and any pre-login CSRF token is
    /// dropped. Returns `None` when the identifier is no longer live, for
    /// example after a racing destroy.
    ///
    /// # Errors
    /// Returns an error only if the OS CSPRNG fails to produce an identifier.
    pub async fn promote(&self, session_id: &str, identity: Identity) -> Result<Option<Session>> {
        let now = Instant::now();
        let mut entries = self.store.entries.lock().await;
        let Some(mut session) = entries.remove(session_id) else {
            return Ok(None);
        };
        session.id = generate_session_id()?;
        session.ledger_key = hash_session_id(&session.id);
        session.identity = Some(identity);
        session.created_at = now;
        session.last_seen_at = now;
        session.rotated_at = now;
        session.csrf = None;
        entries.insert(session.id.clone(), session.clone());
        Ok(Some(session))
    }

    /// Remove a session. Destroying an unknown identifier is a no-op.
    /// Returns the identity that was attached, for audit.
    pub async fn destroy(&self, session_id: &str) -> Option<Identity> {
        let mut entries = self.store.entries.lock().await;
        entries.remove(session_id).and_then(|session| session.identity)
    }

    /// Refresh a session's activity clock without resolving or rotating.
    /// Returns false when the session is unknown or already idle-expired.
    pub(crate) async fn touch(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.store.entries.lock().await;
        match entries.get_mut(session_id) {
            Some(session) if now.duration_since(session.last_seen_at) < self.idle_timeout => {
                session.last_seen_at = now;
                true
            }
            _ => false,
        }
    }

    /// Read a session without refreshing its activity clock.
    pub(crate) async fn peek(&self, session_id: &str) -> Option<Session> {
        let entries = self.store.entries.lock().await;
        entries
            .get(session_id)
            .filter(|session| session.last_seen_at.elapsed() < self.idle_timeout)
            .cloned()
    }

    #[cfg(test)]
    pub(super) async fn live_count(&self) -> usize {
        self.store.entries.lock().await.len()
    }
}

/// Build the session cookie: `HttpOnly`, `SameSite=Strict`, scoped to `/`.
pub(super) fn session_cookie(
    config: &AuthConfig,
    session_id: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.idle_timeout_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    );
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        // A pair without `=` is malformed; skip it, the cookie we want may
        // still follow.
        let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
            return Some(val.trim().to_string());
        }
    }
    None
}
