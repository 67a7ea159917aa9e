//! # Rekey (Forced Password Rotation)
//!
//! `rekey` enforces a "must change password before further use" policy for
//! accounts in an identity platform. An operator or automated rule flags an
//! account by writing a `RequirePasswordChange = Yes` selection into the
//! account's custom-attribute blob; from that point on the account cannot
//! complete a normal login until the password is changed.
//!
//! ## How the pieces fit
//!
//! - The **login interceptor** wraps the login action: a successfully
//!   authenticated but flagged account is signed out again and redirected
//!   into the password-recovery confirmation flow, carrying a durable
//!   recovery token.
//! - The **recovery-confirmation interceptor** wraps the password-reset
//!   action: once the password is changed it writes the flag back to `No`
//!   and completes authentication with the new password, so the user lands
//!   exactly where a normal login would have taken them.
//! - The **reconciler** consumes attribute change events and keeps the
//!   recovery credential consistent with the flag, no matter which path
//!   mutated it (login flow, recovery flow, or a direct administrative
//!   edit). All mutations are idempotent; a duplicated or reordered event
//!   cannot move state backwards.
//!
//! ## Durable recovery credentials
//!
//! A flagged account holds a recovery token with an *absent* generated-at
//! timestamp, which marks it as non-expiring. Ordinary, time-limited
//! recovery tokens share the same storage keys but always carry a
//! timestamp; the policy only ever writes an absent one.

pub mod api;
pub mod cli;
pub mod policy;
pub mod store;
pub mod testkit;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
