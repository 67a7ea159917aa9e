//! Attribute change reconciler.
//!
//! Invoked for every change notification the attribute store emits, from
//! any writer: the recovery flow, an administrative tool, or a bulk import.
//! The handler re-derives the flag classification from the latest persisted
//! blob rather than the event payload, so duplicated or reordered
//! notifications converge on the state implied by the last write, and the
//! two credential mutations it triggers are idempotent.

use tracing::{debug, warn};

use super::attributes::{AttributeChange, ATTRIBUTES_KEY, RECOVERY_TOKEN_KEY, REQUIRE_PASSWORD_CHANGE};
use super::classify::{classify, Classification};
use super::context::PolicyContext;
use super::credential::{clear_credential, ensure_credential};
use super::error::PolicyError;

/// Synchronize credential state with the flag after an attribute change.
///
/// Changes to keys other than the attribute blob and the recovery token are
/// ignored before any parsing happens.
///
/// # Errors
///
/// A malformed blob or a backend failure is returned so the event can be
/// retried; a vanished account is logged and dropped.
pub async fn apply_change(
    ctx: &PolicyContext,
    change: &AttributeChange,
) -> Result<(), PolicyError> {
    match change.key.as_str() {
        ATTRIBUTES_KEY => apply_blob_change(ctx, change).await,
        RECOVERY_TOKEN_KEY => {
            // A writer emptying the token is terminal; there is nothing
            // left to cascade.
            if change.cleared() {
                debug!(account_id = %change.account_id, "recovery token removed");
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn apply_blob_change(
    ctx: &PolicyContext,
    change: &AttributeChange,
) -> Result<(), PolicyError> {
    let Some(account) = ctx.accounts().find_by_id(change.account_id).await? else {
        warn!(
            account_id = %change.account_id,
            "attribute change for unknown account, dropping event"
        );
        return Ok(());
    };

    let Some(definition) = ctx
        .definitions()
        .find_by_name(REQUIRE_PASSWORD_CHANGE)
        .await?
    else {
        // Feature not provisioned: no account can require a change.
        clear_credential(ctx.store(), account.id).await?;
        return Ok(());
    };

    // Classify what is persisted now, not what the event carried; a stale
    // redelivery must not move state backwards.
    let blob = ctx.store().get(account.id, ATTRIBUTES_KEY).await?;

    match classify(blob.as_deref(), &definition)? {
        Classification::Required => {
            ensure_credential(ctx.store(), account.id).await?;
        }
        Classification::NotRequired => {
            clear_credential(ctx.store(), account.id).await?;
        }
        Classification::Indeterminate => {
            warn!(
                account_id = %account.id,
                "indeterminate password-change flag, leaving credential untouched"
            );
        }
    }

    Ok(())
}
