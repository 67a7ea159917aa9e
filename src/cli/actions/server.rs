use crate::api;
use crate::policy::PolicyConfig;
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub usernames_enabled: bool,
    pub session_ttl_seconds: i64,
    pub recovery_token_ttl_seconds: i64,
    pub reconciler_poll_seconds: u64,
    pub reconciler_batch_size: usize,
    pub reconciler_max_attempts: u32,
    pub reconciler_backoff_base_seconds: u64,
    pub reconciler_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let policy_config = PolicyConfig::new(args.frontend_base_url)
        .with_usernames_enabled(args.usernames_enabled)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_recovery_token_ttl_seconds(args.recovery_token_ttl_seconds);

    let reconciler_config = api::ReconcilerConfig::new()
        .with_poll_interval_seconds(args.reconciler_poll_seconds)
        .with_batch_size(args.reconciler_batch_size)
        .with_max_attempts(args.reconciler_max_attempts)
        .with_backoff_base_seconds(args.reconciler_backoff_base_seconds)
        .with_backoff_max_seconds(args.reconciler_backoff_max_seconds);

    api::new(args.port, args.dsn, policy_config, reconciler_config).await
}
