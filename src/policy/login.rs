//! Login interceptor.
//!
//! Wraps the login action and only ever inspects *successful* attempts: a
//! rejected authentication passes through untouched. A successfully
//! authenticated account that classifies as `Required` is signed out again,
//! handed a durable recovery credential, and redirected into the
//! recovery-confirmation flow instead of completing login.

use tracing::{debug, warn};

use super::accounts::AuthOutcome;
use super::classify::{classify_account, Classification};
use super::context::PolicyContext;
use super::credential::ensure_credential;
use super::error::PolicyError;

/// Parameters the caller submitted to the login action.
#[derive(Debug, Clone, Default)]
pub struct LoginSubmission {
    pub email: Option<String>,
    pub username: Option<String>,
    pub return_url: Option<String>,
}

impl LoginSubmission {
    /// The identifier the platform authenticates with, per configuration.
    #[must_use]
    pub fn identifier(&self, usernames_enabled: bool) -> Option<&str> {
        let raw = if usernames_enabled {
            self.username.as_deref()
        } else {
            self.email.as_deref()
        };
        raw.map(str::trim).filter(|identifier| !identifier.is_empty())
    }
}

/// The interceptor's replacement for the action result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginDecision {
    /// Leave the action's own outcome in place.
    PassThrough(AuthOutcome),
    /// Login must not complete; send the caller into recovery confirmation.
    RedirectToRecovery {
        token: String,
        email: String,
        return_url: Option<String>,
    },
}

/// Run the interceptor over a finished login action.
///
/// # Errors
///
/// Classification and credential failures are returned to the caller, which
/// must block the login with a generic failure rather than complete it: the
/// session for the `Required` path has already been terminated by the time
/// any fallible step runs.
pub async fn intercept_login(
    ctx: &PolicyContext,
    submission: &LoginSubmission,
    outcome: AuthOutcome,
) -> Result<LoginDecision, PolicyError> {
    let AuthOutcome::Granted { ref session_token } = outcome else {
        return Ok(LoginDecision::PassThrough(outcome));
    };

    let Some(identifier) = submission.identifier(ctx.config().usernames_enabled()) else {
        return Ok(LoginDecision::PassThrough(outcome));
    };

    let account = if ctx.config().usernames_enabled() {
        ctx.accounts().find_by_username(identifier).await?
    } else {
        ctx.accounts().find_by_email(identifier).await?
    };

    // The action just authenticated this identifier, so a miss here means
    // the account vanished mid-request; let the login stand.
    let Some(account) = account else {
        debug!(identifier, "authenticated account not found, passing through");
        return Ok(LoginDecision::PassThrough(outcome));
    };

    match classify_account(ctx, account.id).await? {
        Classification::NotRequired => Ok(LoginDecision::PassThrough(outcome)),
        Classification::Indeterminate => {
            warn!(
                account_id = %account.id,
                "password-change flag is indeterminate, completing login"
            );
            Ok(LoginDecision::PassThrough(outcome))
        }
        Classification::Required => {
            // Terminate the session first so a failure below can never
            // leave a flagged account logged in.
            ctx.authenticator().sign_out(session_token).await?;

            let token = ensure_credential(ctx.store(), account.id).await?;

            Ok(LoginDecision::RedirectToRecovery {
                token,
                email: account.email,
                return_url: submission.return_url.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::attributes::AttributeStore;
    use crate::policy::credential::current_token;
    use crate::testkit::TestHost;

    #[tokio::test]
    async fn rejected_logins_pass_through() -> Result<(), PolicyError> {
        let host = TestHost::new();
        let ctx = host.context();

        let decision = intercept_login(
            &ctx,
            &LoginSubmission {
                email: Some("alice@example.com".to_string()),
                ..LoginSubmission::default()
            },
            AuthOutcome::Rejected,
        )
        .await?;

        assert_eq!(decision, LoginDecision::PassThrough(AuthOutcome::Rejected));
        Ok(())
    }

    #[tokio::test]
    async fn unflagged_account_completes_login() -> Result<(), PolicyError> {
        let host = TestHost::new();
        let account = host.add_account("alice", "alice@example.com", "hunter2");
        let ctx = host.context();

        let outcome = AuthOutcome::Granted {
            session_token: "sess".to_string(),
        };
        let decision = intercept_login(
            &ctx,
            &LoginSubmission {
                email: Some(account.email.clone()),
                ..LoginSubmission::default()
            },
            outcome.clone(),
        )
        .await?;

        assert_eq!(decision, LoginDecision::PassThrough(outcome));
        Ok(())
    }

    #[tokio::test]
    async fn flagged_account_is_redirected_and_signed_out() -> Result<(), PolicyError> {
        let host = TestHost::new();
        let account = host.add_account("alice", "alice@example.com", "hunter2");
        host.flag_account(account.id).await?;
        let session = host.authenticator.issue_session(account.id);
        let ctx = host.context();

        let decision = intercept_login(
            &ctx,
            &LoginSubmission {
                email: Some(account.email.clone()),
                return_url: Some("/orders".to_string()),
                ..LoginSubmission::default()
            },
            AuthOutcome::Granted {
                session_token: session.clone(),
            },
        )
        .await?;

        let LoginDecision::RedirectToRecovery {
            token,
            email,
            return_url,
        } = decision
        else {
            panic!("expected a redirect decision");
        };
        assert!(!token.is_empty());
        assert_eq!(email, "alice@example.com");
        assert_eq!(return_url.as_deref(), Some("/orders"));
        assert!(!host.authenticator.session_active(&session));
        assert_eq!(
            current_token(ctx.store(), account.id).await?,
            Some(token)
        );
        Ok(())
    }

    #[tokio::test]
    async fn username_mode_resolves_by_username() -> Result<(), PolicyError> {
        let host = TestHost::new().with_usernames_enabled();
        let account = host.add_account("alice", "alice@example.com", "hunter2");
        host.flag_account(account.id).await?;
        let session = host.authenticator.issue_session(account.id);
        let ctx = host.context();

        let decision = intercept_login(
            &ctx,
            &LoginSubmission {
                username: Some("alice".to_string()),
                ..LoginSubmission::default()
            },
            AuthOutcome::Granted {
                session_token: session,
            },
        )
        .await?;

        // redirect still carries the canonical email
        assert!(matches!(
            decision,
            LoginDecision::RedirectToRecovery { email, .. } if email == "alice@example.com"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_definition_disables_the_feature() -> Result<(), PolicyError> {
        let host = TestHost::new_without_definition();
        let account = host.add_account("alice", "alice@example.com", "hunter2");
        let ctx = host.context();

        let outcome = AuthOutcome::Granted {
            session_token: "sess".to_string(),
        };
        let decision = intercept_login(
            &ctx,
            &LoginSubmission {
                email: Some(account.email.clone()),
                ..LoginSubmission::default()
            },
            outcome.clone(),
        )
        .await?;

        assert_eq!(decision, LoginDecision::PassThrough(outcome));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_blob_blocks_login() -> Result<(), PolicyError> {
        let host = TestHost::new();
        let account = host.add_account("alice", "alice@example.com", "hunter2");
        host.store
            .set(
                account.id,
                crate::policy::ATTRIBUTES_KEY,
                Some("corrupt".to_string()),
            )
            .await?;
        let ctx = host.context();

        let result = intercept_login(
            &ctx,
            &LoginSubmission {
                email: Some(account.email.clone()),
                ..LoginSubmission::default()
            },
            AuthOutcome::Granted {
                session_token: "sess".to_string(),
            },
        )
        .await;

        assert!(matches!(result, Err(PolicyError::MalformedBlob(_))));
        Ok(())
    }

    #[tokio::test]
    async fn indeterminate_flag_passes_through() -> Result<(), PolicyError> {
        let host = TestHost::new();
        let account = host.add_account("alice", "alice@example.com", "hunter2");
        host.set_selection(account.id, uuid::Uuid::new_v4()).await?;
        let ctx = host.context();

        let outcome = AuthOutcome::Granted {
            session_token: "sess".to_string(),
        };
        let decision = intercept_login(
            &ctx,
            &LoginSubmission {
                email: Some(account.email.clone()),
                ..LoginSubmission::default()
            },
            outcome.clone(),
        )
        .await?;

        assert_eq!(decision, LoginDecision::PassThrough(outcome));
        Ok(())
    }
}
