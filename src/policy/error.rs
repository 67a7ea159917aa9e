//! Error taxonomy for the policy core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// The attribute blob could not be decoded. Surfaced as a failure for
    /// the affected request or event; corruption is never treated as
    /// "password change not required".
    #[error("malformed attribute blob: {0}")]
    MalformedBlob(String),

    /// A required account could not be resolved. Fatal for the single
    /// request or event that needed it.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The `RequirePasswordChange` definition or one of its permitted values
    /// is not provisioned where the flow must write it.
    #[error("attribute definition {0:?} is not provisioned")]
    DefinitionMissing(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
