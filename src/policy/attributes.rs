//! Attribute store boundary: keys, change notifications, and definitions.
//!
//! The attribute keys below are a stable contract with the host platform;
//! their exact names must not change.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Per-account blob holding every custom attribute selection.
pub const ATTRIBUTES_KEY: &str = "CustomCustomerAttributes";

/// Recovery token. A durable (policy-issued) token has no generated-at date.
pub const RECOVERY_TOKEN_KEY: &str = "PasswordRecoveryToken";

/// Generated-at date for ordinary, expiring recovery tokens. The policy only
/// ever writes this key absent.
pub const RECOVERY_TOKEN_DATE_KEY: &str = "PasswordRecoveryTokenDateGenerated";

/// Name of the selection attribute the policy is driven by.
pub const REQUIRE_PASSWORD_CHANGE: &str = "RequirePasswordChange";

pub const VALUE_YES: &str = "Yes";
pub const VALUE_NO: &str = "No";

/// Per-account key/value store for attribute state.
///
/// `set(.., None)` removes the key. Implementations must emit an
/// [`AttributeChange`] notification for every effective mutation so the
/// reconciler can observe writes made by any caller.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn get(&self, account_id: Uuid, key: &str) -> Result<Option<String>>;

    async fn set(&self, account_id: Uuid, key: &str, value: Option<String>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A change notification for one attribute key of one account.
///
/// The three notification kinds are normalized at construction to "new value
/// or absent": a `Deleted` change never carries a value.
#[derive(Debug, Clone)]
pub struct AttributeChange {
    pub account_id: Uuid,
    pub key: String,
    pub kind: ChangeKind,
    value: Option<String>,
}

impl AttributeChange {
    #[must_use]
    pub fn new(account_id: Uuid, key: String, kind: ChangeKind, value: Option<String>) -> Self {
        let value = match kind {
            ChangeKind::Deleted => None,
            ChangeKind::Inserted | ChangeKind::Updated => value,
        };
        Self {
            account_id,
            key,
            kind,
            value,
        }
    }

    /// The value after the change, absent for deletions.
    #[must_use]
    pub fn new_value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// True when the change left the key empty or absent.
    #[must_use]
    pub fn cleared(&self) -> bool {
        self.value
            .as_deref()
            .map_or(true, |value| value.trim().is_empty())
    }
}

/// One permitted value of a selection attribute definition.
#[derive(Debug, Clone)]
pub struct AttributeValue {
    pub id: Uuid,
    pub name: String,
    pub display_order: i32,
    pub is_pre_selected: bool,
}

/// A named selection attribute with its ordered permitted values.
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    pub id: Uuid,
    pub name: String,
    pub values: Vec<AttributeValue>,
}

impl AttributeDefinition {
    /// Permitted value lookup by name, case-insensitive.
    #[must_use]
    pub fn value_named(&self, name: &str) -> Option<&AttributeValue> {
        self.values
            .iter()
            .find(|value| value.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn value_by_id(&self, id: Uuid) -> Option<&AttributeValue> {
        self.values.iter().find(|value| value.id == id)
    }
}

/// Read-only lookup of attribute definitions by name.
#[async_trait]
pub trait DefinitionRegistry: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<AttributeDefinition>>;
}
