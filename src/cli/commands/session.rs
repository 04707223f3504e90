//! Session and credential policy arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

pub const ARG_IDLE_TIMEOUT_SECONDS: &str = "idle-timeout-seconds";
pub const ARG_ROTATION_INTERVAL_SECONDS: &str = "rotation-interval-seconds";
pub const ARG_CSRF_TTL_SECONDS: &str = "csrf-ttl-seconds";
pub const ARG_LOGIN_FAILURE_DELAY_MS: &str = "login-failure-delay-ms";
pub const ARG_BIND_CLIENT_ADDR: &str = "bind-client-addr";
pub const ARG_INSECURE_COOKIES: &str = "insecure-cookies";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDLE_TIMEOUT_SECONDS)
                .long(ARG_IDLE_TIMEOUT_SECONDS)
                .help("Destroy sessions idle for longer than this many seconds")
                .default_value("1800")
                .env("GARDI_IDLE_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ROTATION_INTERVAL_SECONDS)
                .long(ARG_ROTATION_INTERVAL_SECONDS)
                .help("Rotate session identifiers after this many seconds")
                .default_value("300")
                .env("GARDI_ROTATION_INTERVAL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_CSRF_TTL_SECONDS)
                .long(ARG_CSRF_TTL_SECONDS)
                .help("CSRF tokens expire after this many seconds")
                .default_value("3600")
                .env("GARDI_CSRF_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_LOGIN_FAILURE_DELAY_MS)
                .long(ARG_LOGIN_FAILURE_DELAY_MS)
                .help("Minimum latency in milliseconds for any failed login")
                .default_value("2000")
                .env("GARDI_LOGIN_FAILURE_DELAY_MS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BIND_CLIENT_ADDR)
                .long(ARG_BIND_CLIENT_ADDR)
                .help("Also bind sessions to the client address, not just the user agent")
                .env("GARDI_BIND_CLIENT_ADDR")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_INSECURE_COOKIES)
                .long(ARG_INSECURE_COOKIES)
                .help("Drop the Secure cookie attribute (local development without TLS)")
                .env("GARDI_INSECURE_COOKIES")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
    pub idle_timeout_seconds: u64,
    pub rotation_interval_seconds: u64,
    pub csrf_ttl_seconds: u64,
    pub login_failure_delay_ms: u64,
    pub bind_client_addr: bool,
    pub insecure_cookies: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing from the matches.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            idle_timeout_seconds: matches
                .get_one::<u64>(ARG_IDLE_TIMEOUT_SECONDS)
                .copied()
                .context("missing idle-timeout-seconds")?,
            rotation_interval_seconds: matches
                .get_one::<u64>(ARG_ROTATION_INTERVAL_SECONDS)
                .copied()
                .context("missing rotation-interval-seconds")?,
            csrf_ttl_seconds: matches
                .get_one::<u64>(ARG_CSRF_TTL_SECONDS)
                .copied()
                .context("missing csrf-ttl-seconds")?,
            login_failure_delay_ms: matches
                .get_one::<u64>(ARG_LOGIN_FAILURE_DELAY_MS)
                .copied()
                .context("missing login-failure-delay-ms")?,
            bind_client_addr: matches.get_flag(ARG_BIND_CLIENT_ADDR),
            insecure_cookies: matches.get_flag(ARG_INSECURE_COOKIES),
        })
    }
}
