//! Account lookup and authentication boundary.
//!
//! The policy never creates or deletes accounts; it resolves them by
//! identifier and asks the host to complete or terminate sessions.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;
}

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted { session_token: String },
    Rejected,
}

impl AuthOutcome {
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::Granted { session_token } => Some(session_token),
            Self::Rejected => None,
        }
    }
}

/// Session creation and termination, delegated to the host's primitives.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify the password and produce a session, or reject.
    async fn sign_in(&self, account: &Account, password: &SecretString) -> Result<AuthOutcome>;

    /// Terminate a session. Idempotent; unknown tokens are a no-op.
    async fn sign_out(&self, session_token: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_accessor() {
        let granted = AuthOutcome::Granted {
            session_token: "abc".to_string(),
        };
        assert_eq!(granted.session_token(), Some("abc"));
        assert_eq!(AuthOutcome::Rejected.session_token(), None);
    }
}
