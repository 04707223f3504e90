//! Structured security events.
//!
//! Every event carries the client address when known. Filter on the
//! `security` target to feed these into alerting.

use tracing::{info, warn};

pub(super) fn login_succeeded(client_addr: Option<&str>, username: &str) {
    info!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        user = username,
        "Successful login"
    );
}

pub(super) fn login_failed(client_addr: Option<&str>, username: &str) {
    warn!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        user = username,
        "Failed login attempt"
    );
}

pub(super) fn logout(client_addr: Option<&str>, username: &str) {
    info!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        user = username,
        "Logout"
    );
}

pub(super) fn csrf_rejected(client_addr: Option<&str>, route: &str) {
    warn!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        route = route,
        "CSRF validation failed"
    );
}

pub(super) fn fingerprint_mismatch(client_addr: Option<&str>, username: Option<&str>) {
    warn!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        user = username.unwrap_or("anonymous"),
        "Session fingerprint mismatch, session destroyed"
    );
}

pub(super) fn session_timed_out(client_addr: Option<&str>, username: Option<&str>) {
    info!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        user = username.unwrap_or("anonymous"),
        "Session expired after inactivity"
    );
}

pub(super) fn registration(client_addr: Option<&str>, username: &str) {
    info!(
        target: "security",
        client_addr = client_addr.unwrap_or("unknown"),
        user = username,
        "New user registered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercises every event macro, with and without a known client address.
    #[test]
    fn events_accept_optional_fields() {
        login_succeeded(Some("1.2.3.4"), "alice");
        login_failed(None, "alice");
        logout(Some("1.2.3.4"), "alice");
        csrf_rejected(None, "/v1/auth/login");
        fingerprint_mismatch(Some("1.2.3.4"), None);
        session_timed_out(None, Some("alice"));
        registration(None, "alice");
    }
}
