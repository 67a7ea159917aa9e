use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_USERNAMES_ENABLED: &str = "usernames-enabled";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_RECOVERY_TOKEN_TTL_SECONDS: &str = "recovery-token-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Base URL of the account frontend, used for recovery redirects and CORS")
                .env("REKEY_FRONTEND_BASE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_USERNAMES_ENABLED)
                .long(ARG_USERNAMES_ENABLED)
                .help("Authenticate with usernames instead of email addresses")
                .env("REKEY_USERNAMES_ENABLED")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("REKEY_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RECOVERY_TOKEN_TTL_SECONDS)
                .long(ARG_RECOVERY_TOKEN_TTL_SECONDS)
                .help("Lifetime of ordinary (dated) recovery tokens in seconds")
                .env("REKEY_RECOVERY_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub usernames_enabled: bool,
    pub session_ttl_seconds: i64,
    pub recovery_token_ttl_seconds: i64,
}

impl Options {
    /// Extract policy options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            usernames_enabled: matches.get_flag(ARG_USERNAMES_ENABLED),
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(43200),
            recovery_token_ttl_seconds: matches
                .get_one::<i64>(ARG_RECOVERY_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
        })
    }
}
