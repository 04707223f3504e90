//! Auth handlers and supporting modules.
//!
//! Three pieces cooperate here:
//!
//! - the session lifecycle manager ([`session`]), which owns creation,
//!   validation, rotation, promotion, and destruction;
//! - the CSRF token manager ([`csrf`]), bound to the same session store;
//! - the credential verifier ([`verifier`]), which gates promotion and keeps
//!   failures uniform in content and timing.
//!
//! Handlers in [`login`] and [`session_info`] are the HTTP surface over that
//! core; [`storage`] adapts it to Postgres and keeps the session ledger.

mod audit;
mod csrf;
pub(crate) mod login;
pub(crate) mod principal;
pub(crate) mod session;
pub(crate) mod session_info;
mod state;
mod storage;
pub(crate) mod types;
mod utils;
mod verifier;

pub use csrf::CsrfManager;
pub use session::{Fingerprint, Identity, Resolution, ResolveOutcome, Session, SessionManager};
pub use state::{AuthConfig, AuthState};
pub use storage::PgCredentialStore;
pub use verifier::{CredentialStore, CredentialVerifier, UserRecord, VerifyOutcome};
