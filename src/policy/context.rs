//! Per-process collaborator bundle.
//!
//! All collaborators are passed in once at the composition boundary and
//! carried explicitly through every flow; nothing in the core reaches into
//! an ambient registry at call time.

use std::sync::Arc;

use super::accounts::{AccountDirectory, Authenticator};
use super::attributes::{AttributeStore, DefinitionRegistry};
use super::config::PolicyConfig;

#[derive(Clone)]
pub struct PolicyContext {
    config: PolicyConfig,
    store: Arc<dyn AttributeStore>,
    accounts: Arc<dyn AccountDirectory>,
    authenticator: Arc<dyn Authenticator>,
    definitions: Arc<dyn DefinitionRegistry>,
}

impl PolicyContext {
    #[must_use]
    pub fn new(
        config: PolicyConfig,
        store: Arc<dyn AttributeStore>,
        accounts: Arc<dyn AccountDirectory>,
        authenticator: Arc<dyn Authenticator>,
        definitions: Arc<dyn DefinitionRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            accounts,
            authenticator,
            definitions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn AttributeStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn accounts(&self) -> &dyn AccountDirectory {
        self.accounts.as_ref()
    }

    #[must_use]
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    #[must_use]
    pub fn definitions(&self) -> &dyn DefinitionRegistry {
        self.definitions.as_ref()
    }
}
