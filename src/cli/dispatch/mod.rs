//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::session;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        idle_timeout_seconds: session_opts.idle_timeout_seconds,
        rotation_interval_seconds: session_opts.rotation_interval_seconds,
        csrf_ttl_seconds: session_opts.csrf_ttl_seconds,
        login_failure_delay_ms: session_opts.login_failure_delay_ms,
        bind_client_addr: session_opts.bind_client_addr,
        insecure_cookies: session_opts.insecure_cookies,
    }))
}
