//! PostgreSQL-backed implementations of the policy's collaborator traits.
//!
//! Attribute writes and their change notifications share one transaction:
//! every effective mutation of `account_attributes` also inserts a row into
//! the `attribute_change_events` outbox, which the reconciler worker drains.
//! This keeps the notification stream complete for *any* writer that goes
//! through the store, including administrative tools.

pub mod accounts;
pub mod definitions;
pub mod postgres;
pub mod schema;

pub use accounts::{PgAccountDirectory, PgAuthenticator};
pub use definitions::PgDefinitionRegistry;
pub use postgres::PgAttributeStore;
