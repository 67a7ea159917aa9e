//! Password-change-requirement policy core.
//!
//! The policy is a small state machine spread over three attribute keys of
//! the host's per-account attribute store:
//!
//! - the custom-attribute blob, whose `RequirePasswordChange` selection is
//!   the flag itself,
//! - the recovery token, and
//! - the recovery token's generated-at timestamp (absent = non-expiring).
//!
//! Three independent triggers mutate this state: an explicit attribute edit,
//! a login attempt, and a recovery confirmation. There is no transaction
//! boundary spanning the three keys, so every mutation here is idempotent
//! and every decision re-derives the flag classification from the latest
//! persisted blob. [`reconcile::apply_change`] converges credential state
//! after any write, regardless of which trigger produced it.

pub mod accounts;
pub mod attributes;
pub mod blob;
pub mod classify;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod login;
pub mod reconcile;
pub mod recovery;

pub use accounts::{Account, AccountDirectory, AuthOutcome, Authenticator};
pub use attributes::{
    AttributeChange, AttributeDefinition, AttributeStore, AttributeValue, ChangeKind,
    DefinitionRegistry, ATTRIBUTES_KEY, RECOVERY_TOKEN_DATE_KEY, RECOVERY_TOKEN_KEY,
    REQUIRE_PASSWORD_CHANGE, VALUE_NO, VALUE_YES,
};
pub use classify::Classification;
pub use config::PolicyConfig;
pub use context::PolicyContext;
pub use error::PolicyError;
