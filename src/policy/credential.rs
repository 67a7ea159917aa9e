//! Durable recovery credential manager.
//!
//! The credential is a `(token, generated-at)` pair under the shared
//! recovery-token keys. An absent generated-at date marks the token as
//! non-expiring, which is what distinguishes a policy-issued credential from
//! an ordinary, time-limited recovery token. Both mutations here are
//! idempotent; the manager holds no state of its own.

use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use super::attributes::{AttributeStore, RECOVERY_TOKEN_DATE_KEY, RECOVERY_TOKEN_KEY};
use super::error::PolicyError;

/// Return the account's durable recovery token, generating one if absent.
///
/// The generated-at date is forced absent on every call: if an ordinary
/// expiring token already occupied the key, it becomes the durable one.
pub async fn ensure_credential(
    store: &dyn AttributeStore,
    account_id: Uuid,
) -> Result<String, PolicyError> {
    let token = match current_token(store, account_id).await? {
        Some(token) => token,
        None => {
            let token = generate_recovery_token()?;
            store
                .set(account_id, RECOVERY_TOKEN_KEY, Some(token.clone()))
                .await?;
            token
        }
    };

    store.set(account_id, RECOVERY_TOKEN_DATE_KEY, None).await?;

    Ok(token)
}

/// Remove the account's recovery token and its generated-at date.
pub async fn clear_credential(
    store: &dyn AttributeStore,
    account_id: Uuid,
) -> Result<(), PolicyError> {
    store.set(account_id, RECOVERY_TOKEN_KEY, None).await?;
    store.set(account_id, RECOVERY_TOKEN_DATE_KEY, None).await?;
    Ok(())
}

/// The current recovery token, with blank values treated as absent.
pub async fn current_token(
    store: &dyn AttributeStore,
    account_id: Uuid,
) -> Result<Option<String>, PolicyError> {
    let token = store
        .get(account_id, RECOVERY_TOKEN_KEY)
        .await?
        .filter(|token| !token.trim().is_empty());
    Ok(token)
}

/// 128 bits of OS entropy, base64url without padding.
fn generate_recovery_token() -> Result<String, PolicyError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate recovery token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
