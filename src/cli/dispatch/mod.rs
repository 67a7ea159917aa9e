//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the server with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{policy, reconciler};
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

    let policy_opts = policy::Options::parse(matches)?;
    let reconciler_opts = reconciler::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: policy_opts.frontend_base_url,
        usernames_enabled: policy_opts.usernames_enabled,
        session_ttl_seconds: policy_opts.session_ttl_seconds,
        recovery_token_ttl_seconds: policy_opts.recovery_token_ttl_seconds,
        reconciler_poll_seconds: reconciler_opts.poll_seconds,
        reconciler_batch_size: reconciler_opts.batch_size,
        reconciler_max_attempts: reconciler_opts.max_attempts,
        reconciler_backoff_base_seconds: reconciler_opts.backoff_base_seconds,
        reconciler_backoff_max_seconds: reconciler_opts.backoff_max_seconds,
    }))
}
