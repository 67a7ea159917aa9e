use anyhow::Result;
use clap::{Arg, Command};

pub const ARG_POLL_SECONDS: &str = "reconciler-poll-seconds";
pub const ARG_BATCH_SIZE: &str = "reconciler-batch-size";
pub const ARG_MAX_ATTEMPTS: &str = "reconciler-max-attempts";
pub const ARG_BACKOFF_BASE_SECONDS: &str = "reconciler-backoff-base-seconds";
pub const ARG_BACKOFF_MAX_SECONDS: &str = "reconciler-backoff-max-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_POLL_SECONDS)
                .long(ARG_POLL_SECONDS)
                .help("Attribute event poll interval in seconds")
                .env("REKEY_RECONCILER_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BATCH_SIZE)
                .long(ARG_BATCH_SIZE)
                .help("Attribute events handled per poll")
                .env("REKEY_RECONCILER_BATCH_SIZE")
                .default_value("25")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Attempts before a failing event is parked")
                .env("REKEY_RECONCILER_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_BACKOFF_BASE_SECONDS)
                .long(ARG_BACKOFF_BASE_SECONDS)
                .help("Base retry backoff in seconds")
                .env("REKEY_RECONCILER_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BACKOFF_MAX_SECONDS)
                .long(ARG_BACKOFF_MAX_SECONDS)
                .help("Maximum retry backoff in seconds")
                .env("REKEY_RECONCILER_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Extract reconciler options from parsed matches.
    ///
    /// # Errors
    /// Currently infallible; kept fallible for parity with the other option
    /// parsers.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            poll_seconds: matches
                .get_one::<u64>(ARG_POLL_SECONDS)
                .copied()
                .unwrap_or(5),
            batch_size: matches
                .get_one::<usize>(ARG_BATCH_SIZE)
                .copied()
                .unwrap_or(25),
            max_attempts: matches
                .get_one::<u32>(ARG_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>(ARG_BACKOFF_BASE_SECONDS)
                .copied()
                .unwrap_or(5),
            backoff_max_seconds: matches
                .get_one::<u64>(ARG_BACKOFF_MAX_SECONDS)
                .copied()
                .unwrap_or(300),
        })
    }
}
