//! Lookup of template variables across the secure and plain stores.

use crate::store::SecureVariableStore;
use crate::types::DecryptedSecret;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A plaintext source of variable values.
pub trait VariableSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl VariableSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl VariableSource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Secure store first, then an optional plain source.
pub struct VariableResolver<'a> {
    secure: &'a SecureVariableStore,
    plain: Option<&'a dyn VariableSource>,
}

impl<'a> VariableResolver<'a> {
    pub fn new(secure: &'a SecureVariableStore) -> Self {
        Self {
            secure,
            plain: None,
        }
    }

    pub fn with_plain(mut self, plain: &'a dyn VariableSource) -> Self {
        self.plain = Some(plain);
        self
    }

    /// Resolve `name`. Only names present in the secure store trigger
    /// authentication.
    pub async fn resolve(&self, name: &str) -> Option<DecryptedSecret> {
        match self.secure.contains(name).await {
            Ok(true) => {
                debug!(variable = name, "resolving from secure store");
                return self.secure.get(name).await;
            }
            Ok(false) => {}
            Err(e) => debug!(variable = name, error = %e, "secure store unavailable"),
        }

        self.plain
            .and_then(|plain| plain.lookup(name))
            .map(DecryptedSecret::new)
    }
}

/// The secure variable holding the API key for `provider` (`{provider}_api_key`).
pub async fn api_key_for_provider(
    store: &SecureVariableStore,
    provider: &str,
) -> Option<DecryptedSecret> {
    store.get(&provider_key_name(provider)).await
}

/// Name under which a provider's API key is stored.
pub fn provider_key_name(provider: &str) -> String {
    format!("{}_api_key", provider.trim().to_lowercase())
}
