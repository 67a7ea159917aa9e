//! Recovery-confirmation interceptor.
//!
//! Wraps the password-recovery confirmation action. Once the action reports
//! the password changed, the interceptor writes the `RequirePasswordChange =
//! No` selection back into the account's blob and completes authentication
//! with the new password, so the caller cannot tell the outcome apart from a
//! normal login.
//!
//! The credential itself is deliberately NOT cleared here. The blob write
//! emits an attribute change event, and the reconciler clears the credential
//! from that event, through the same code path an administrative edit takes.

use anyhow::anyhow;
use secrecy::SecretString;

use super::accounts::AuthOutcome;
use super::attributes::{ATTRIBUTES_KEY, REQUIRE_PASSWORD_CHANGE, VALUE_NO};
use super::blob::encode_with_selection;
use super::context::PolicyContext;
use super::error::PolicyError;

/// Parameters the caller submitted to the confirmation action.
#[derive(Debug, Clone)]
pub struct RecoveryConfirmation {
    pub email: String,
    pub new_password: SecretString,
    pub return_url: Option<String>,
}

/// The confirmation action's own outcome, matched against its success
/// marker before the interceptor acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    PasswordChanged,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Leave the action's own outcome in place.
    PassThrough(RecoveryOutcome),
    /// Password changed; the caller now holds a fresh session.
    Authenticated {
        session_token: String,
        return_url: Option<String>,
    },
}

/// Run the interceptor over a finished recovery-confirmation action.
///
/// # Errors
///
/// [`PolicyError::AccountNotFound`] when the submitted email resolves to no
/// account; the action just reset that account's password, so this is an
/// inconsistent caller and must not be swallowed. Definition lookups that
/// fail surface as [`PolicyError::DefinitionMissing`].
pub async fn intercept_recovery_confirm(
    ctx: &PolicyContext,
    confirmation: &RecoveryConfirmation,
    outcome: RecoveryOutcome,
) -> Result<RecoveryDecision, PolicyError> {
    if outcome != RecoveryOutcome::PasswordChanged {
        return Ok(RecoveryDecision::PassThrough(outcome));
    }

    let account = ctx
        .accounts()
        .find_by_email(confirmation.email.trim())
        .await?
        .ok_or_else(|| PolicyError::AccountNotFound(confirmation.email.clone()))?;

    let definition = ctx
        .definitions()
        .find_by_name(REQUIRE_PASSWORD_CHANGE)
        .await?
        .ok_or_else(|| PolicyError::DefinitionMissing(REQUIRE_PASSWORD_CHANGE.to_string()))?;
    let no_value = definition
        .value_named(VALUE_NO)
        .ok_or_else(|| PolicyError::DefinitionMissing(REQUIRE_PASSWORD_CHANGE.to_string()))?;

    let blob = ctx.store().get(account.id, ATTRIBUTES_KEY).await?;
    let updated = encode_with_selection(blob.as_deref(), &definition, no_value)?;
    ctx.store()
        .set(account.id, ATTRIBUTES_KEY, Some(updated))
        .await?;

    match ctx
        .authenticator()
        .sign_in(&account, &confirmation.new_password)
        .await?
    {
        AuthOutcome::Granted { session_token } => Ok(RecoveryDecision::Authenticated {
            session_token,
            return_url: confirmation.return_url.clone(),
        }),
        AuthOutcome::Rejected => Err(PolicyError::Backend(anyhow!(
            "freshly reset password was rejected for account {}",
            account.id
        ))),
    }
}
