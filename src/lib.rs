//! # Gardi (Session Security & Authentication Core)
//!
//! `gardi` authenticates users over stateless HTTP and maintains a
//! tamper-resistant session across requests. Three tightly coupled pieces
//! make up the core:
//!
//! - **Session lifecycle**: sessions start Anonymous on first contact, are
//!   validated on every request (idle timeout, user-agent fingerprint), have
//!   their identifier rotated on a schedule, and are promoted to
//!   Authenticated only by a successful credential check. Promotion always
//!   issues a new identifier so a fixated pre-login identifier is worthless.
//! - **CSRF protection**: every state-changing request must carry a token
//!   bound to the current session. Tokens are compared in constant time and
//!   stay valid until expiry or identifier promotion, so multiple forms per
//!   page keep working.
//! - **Credential verification**: Argon2id password hashes, a single
//!   generic failure for unknown-user and wrong-password, and a fixed
//!   minimum latency on every failed attempt so neither content nor timing
//!   leaks which factor failed.
//!
//! ## Fail-closed policy
//!
//! Ambiguity always resolves to the least-privileged outcome: an unknown
//! session identifier yields a fresh anonymous session, a store error yields
//! "not authenticated", and a CSRF check with any missing piece rejects the
//! request before side effects.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
