//! In-memory collaborator implementations.
//!
//! Used by this crate's own tests and by embedding hosts that want to
//! exercise the policy flows without a database. The memory attribute store
//! records every change notification it would have emitted so tests can
//! replay them through the reconciler in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::policy::attributes::{
    AttributeChange, AttributeDefinition, AttributeStore, AttributeValue, ChangeKind,
    DefinitionRegistry, ATTRIBUTES_KEY, REQUIRE_PASSWORD_CHANGE, VALUE_NO, VALUE_YES,
};
use crate::policy::accounts::{Account, AccountDirectory, AuthOutcome, Authenticator};
use crate::policy::blob::encode_with_selection;
use crate::policy::config::PolicyConfig;
use crate::policy::context::PolicyContext;
use crate::policy::error::PolicyError;

/// Attribute store backed by a hash map, with a change-event journal.
#[derive(Default)]
pub struct MemoryAttributeStore {
    values: Mutex<HashMap<(Uuid, String), String>>,
    events: Mutex<Vec<AttributeChange>>,
}

impl MemoryAttributeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every change notification recorded so far, oldest first.
    pub fn drain_events(&self) -> Vec<AttributeChange> {
        match self.events.lock() {
            Ok(mut events) => events.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read(&self, account_id: Uuid, key: &str) -> Option<String> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(&(account_id, key.to_string())).cloned())
    }

    fn write(&self, account_id: Uuid, key: &str, value: Option<String>) {
        let Ok(mut values) = self.values.lock() else {
            return;
        };
        let entry_key = (account_id, key.to_string());
        let change = match value {
            Some(value) => {
                let kind = if values.contains_key(&entry_key) {
                    ChangeKind::Updated
                } else {
                    ChangeKind::Inserted
                };
                values.insert(entry_key, value.clone());
                Some(AttributeChange::new(
                    account_id,
                    key.to_string(),
                    kind,
                    Some(value),
                ))
            }
            None => values.remove(&entry_key).map(|_| {
                AttributeChange::new(account_id, key.to_string(), ChangeKind::Deleted, None)
            }),
        };
        if let (Some(change), Ok(mut events)) = (change, self.events.lock()) {
            events.push(change);
        }
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn get(&self, account_id: Uuid, key: &str) -> Result<Option<String>> {
        Ok(self.read(account_id, key))
    }

    async fn set(&self, account_id: Uuid, key: &str, value: Option<String>) -> Result<()> {
        self.write(account_id, key, value);
        Ok(())
    }
}

/// Account directory backed by a vector.
#[derive(Default)]
pub struct MemoryAccounts {
    inner: Mutex<Vec<(Account, String)>>,
}

impl MemoryAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, username: &str, email: &str, password: &str) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
        };
        if let Ok(mut inner) = self.inner.lock() {
            inner.push((account.clone(), password.to_string()));
        }
        account
    }

    pub fn set_password(&self, id: Uuid, password: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(entry) = inner.iter_mut().find(|(account, _)| account.id == id) {
                entry.1 = password.to_string();
            }
        }
    }

    #[must_use]
    pub fn password_matches(&self, id: Uuid, password: &str) -> bool {
        self.inner.lock().is_ok_and(|inner| {
            inner
                .iter()
                .any(|(account, stored)| account.id == id && stored == password)
        })
    }

    fn find(&self, predicate: impl Fn(&Account) -> bool) -> Option<Account> {
        self.inner.lock().ok().and_then(|inner| {
            inner
                .iter()
                .map(|(account, _)| account)
                .find(|account| predicate(account))
                .cloned()
        })
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccounts {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.find(|account| account.id == id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(self.find(|account| account.username.eq_ignore_ascii_case(username)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.find(|account| account.email.eq_ignore_ascii_case(email)))
    }
}

/// Authenticator keeping plain-text passwords and session tokens in memory.
pub struct MemoryAuthenticator {
    accounts: Arc<MemoryAccounts>,
    sessions: Mutex<Vec<String>>,
    counter: AtomicU64,
}

impl MemoryAuthenticator {
    #[must_use]
    pub fn new(accounts: Arc<MemoryAccounts>) -> Self {
        Self {
            accounts,
            sessions: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Mint a session without a password check, for test setup.
    pub fn issue_session(&self, account_id: Uuid) -> String {
        let serial = self.counter.fetch_add(1, Ordering::Relaxed);
        let token = format!("session-{account_id}-{serial}");
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(token.clone());
        }
        token
    }

    #[must_use]
    pub fn session_active(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .is_ok_and(|sessions| sessions.iter().any(|session| session == token))
    }
}

#[async_trait]
impl Authenticator for MemoryAuthenticator {
    async fn sign_in(&self, account: &Account, password: &SecretString) -> Result<AuthOutcome> {
        if self
            .accounts
            .password_matches(account.id, password.expose_secret())
        {
            Ok(AuthOutcome::Granted {
                session_token: self.issue_session(account.id),
            })
        } else {
            Ok(AuthOutcome::Rejected)
        }
    }

    async fn sign_out(&self, session_token: &str) -> Result<()> {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.retain(|session| session != session_token);
        }
        Ok(())
    }
}

/// Definition registry backed by a vector.
#[derive(Default)]
pub struct MemoryDefinitions {
    definitions: Mutex<Vec<AttributeDefinition>>,
}

impl MemoryDefinitions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: AttributeDefinition) {
        if let Ok(mut definitions) = self.definitions.lock() {
            definitions.push(definition);
        }
    }
}

#[async_trait]
impl DefinitionRegistry for MemoryDefinitions {
    async fn find_by_name(&self, name: &str) -> Result<Option<AttributeDefinition>> {
        Ok(self.definitions.lock().ok().and_then(|definitions| {
            definitions
                .iter()
                .find(|definition| definition.name.eq_ignore_ascii_case(name))
                .cloned()
        }))
    }
}

/// Build the standard `RequirePasswordChange` definition with `Yes`
/// pre-selected, the shape the provisioning step creates in production.
#[must_use]
pub fn require_password_change_definition() -> AttributeDefinition {
    AttributeDefinition {
        id: Uuid::new_v4(),
        name: REQUIRE_PASSWORD_CHANGE.to_string(),
        values: vec![
            AttributeValue {
                id: Uuid::new_v4(),
                name: VALUE_YES.to_string(),
                display_order: i32::MIN,
                is_pre_selected: true,
            },
            AttributeValue {
                id: Uuid::new_v4(),
                name: VALUE_NO.to_string(),
                display_order: i32::MAX,
                is_pre_selected: false,
            },
        ],
    }
}

/// A fully wired in-memory host for exercising the policy flows.
pub struct TestHost {
    pub store: Arc<MemoryAttributeStore>,
    pub accounts: Arc<MemoryAccounts>,
    pub authenticator: Arc<MemoryAuthenticator>,
    pub definitions: Arc<MemoryDefinitions>,
    config: PolicyConfig,
    definition: Option<AttributeDefinition>,
}

impl TestHost {
    #[must_use]
    pub fn new() -> Self {
        let host = Self::new_without_definition();
        let definition = require_password_change_definition();
        host.definitions.insert(definition.clone());
        Self {
            definition: Some(definition),
            ..host
        }
    }

    #[must_use]
    pub fn new_without_definition() -> Self {
        let accounts = Arc::new(MemoryAccounts::new());
        Self {
            store: Arc::new(MemoryAttributeStore::new()),
            authenticator: Arc::new(MemoryAuthenticator::new(accounts.clone())),
            accounts,
            definitions: Arc::new(MemoryDefinitions::new()),
            config: PolicyConfig::new("https://accounts.example.com".to_string()),
            definition: None,
        }
    }

    #[must_use]
    pub fn with_usernames_enabled(mut self) -> Self {
        self.config = self.config.with_usernames_enabled(true);
        self
    }

    #[must_use]
    pub fn context(&self) -> PolicyContext {
        PolicyContext::new(
            self.config.clone(),
            self.store.clone(),
            self.accounts.clone(),
            self.authenticator.clone(),
            self.definitions.clone(),
        )
    }

    pub fn add_account(&self, username: &str, email: &str, password: &str) -> Account {
        self.accounts.add(username, email, password)
    }

    /// The provisioned definition; panics when the host was built without one.
    #[must_use]
    pub fn definition(&self) -> &AttributeDefinition {
        self.definition
            .as_ref()
            .expect("host was built without the RequirePasswordChange definition")
    }

    /// Write `RequirePasswordChange = Yes` into the account's blob, the way
    /// an administrative edit would.
    pub async fn flag_account(&self, account_id: Uuid) -> Result<(), PolicyError> {
        self.write_selection(account_id, VALUE_YES).await
    }

    /// Write `RequirePasswordChange = No` into the account's blob.
    pub async fn unflag_account(&self, account_id: Uuid) -> Result<(), PolicyError> {
        self.write_selection(account_id, VALUE_NO).await
    }

    async fn write_selection(&self, account_id: Uuid, value_name: &str) -> Result<(), PolicyError> {
        let definition = self.definition().clone();
        let value = definition
            .value_named(value_name)
            .ok_or_else(|| PolicyError::DefinitionMissing(definition.name.clone()))?;
        let blob = self.store.get(account_id, ATTRIBUTES_KEY).await?;
        let updated = encode_with_selection(blob.as_deref(), &definition, value)?;
        self.store
            .set(account_id, ATTRIBUTES_KEY, Some(updated))
            .await?;
        Ok(())
    }

    /// Write a selection pointing at an arbitrary value id, for exercising
    /// the indeterminate path.
    pub async fn set_selection(
        &self,
        account_id: Uuid,
        value_id: Uuid,
    ) -> Result<(), PolicyError> {
        let definition = self.definition().clone();
        let raw = serde_json::to_string(&[crate::policy::blob::Selection {
            definition_id: definition.id,
            value_id,
        }])
        .map_err(|err| PolicyError::MalformedBlob(err.to_string()))?;
        self.store
            .set(account_id, ATTRIBUTES_KEY, Some(raw))
            .await?;
        Ok(())
    }

    /// Take the store's change-event journal, oldest first.
    pub async fn drain_events(&self) -> Vec<AttributeChange> {
        self.store.drain_events()
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_records_change_kinds() -> Result<()> {
        let store = MemoryAttributeStore::new();
        let account_id = Uuid::new_v4();

        store
            .set(account_id, ATTRIBUTES_KEY, Some("[]".to_string()))
            .await?;
        store
            .set(account_id, ATTRIBUTES_KEY, Some("[]".to_string()))
            .await?;
        store.set(account_id, ATTRIBUTES_KEY, None).await?;
        // removing an absent key emits nothing
        store.set(account_id, ATTRIBUTES_KEY, None).await?;

        let kinds: Vec<ChangeKind> = store
            .drain_events()
            .into_iter()
            .map(|change| change.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Inserted, ChangeKind::Updated, ChangeKind::Deleted]
        );
        Ok(())
    }

    #[tokio::test]
    async fn accounts_lookup_is_case_insensitive() -> Result<()> {
        let accounts = MemoryAccounts::new();
        let account = accounts.add("Alice", "Alice@Example.com", "pw");

        assert_eq!(
            accounts
                .find_by_email("alice@example.COM")
                .await?
                .map(|found| found.id),
            Some(account.id)
        );
        assert_eq!(
            accounts
                .find_by_username("alice")
                .await?
                .map(|found| found.id),
            Some(account.id)
        );
        Ok(())
    }

    #[tokio::test]
    async fn authenticator_round_trip() -> Result<()> {
        let accounts = Arc::new(MemoryAccounts::new());
        let account = accounts.add("alice", "alice@example.com", "pw");
        let authenticator = MemoryAuthenticator::new(accounts);

        let outcome = authenticator
            .sign_in(&account, &SecretString::from("pw".to_string()))
            .await?;
        let token = outcome.session_token().map(ToString::to_string);
        let token = token.expect("session expected");
        assert!(authenticator.session_active(&token));

        authenticator.sign_out(&token).await?;
        assert!(!authenticator.session_active(&token));

        let outcome = authenticator
            .sign_in(&account, &SecretString::from("wrong".to_string()))
            .await?;
        assert_eq!(outcome, AuthOutcome::Rejected);
        Ok(())
    }
}
