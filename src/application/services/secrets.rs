//! Vault lookup and on-demand decryption of encrypted values.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{Configuration, DomainError, NodeId, SecurityFault};
use crate::infrastructure::traits::Vault;

/// Vault used when a configuration does not name one.
pub const DEFAULT_VAULT: &str = "default";

/// Named vaults available to the loader.
#[derive(Clone, Default)]
pub struct VaultRegistry {
    vaults: HashMap<String, Arc<dyn Vault>>,
}

impl VaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a vault under its own name, replacing any previous one.
    pub fn register(&mut self, vault: Arc<dyn Vault>) {
        self.vaults.insert(vault.name().to_string(), vault);
    }

    pub fn with(mut self, vault: Arc<dyn Vault>) -> Self {
        self.register(vault);
        self
    }

    /// Vault called `name`, or the default vault for `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn Vault>, SecurityFault> {
        let name = name.unwrap_or(DEFAULT_VAULT);
        self.vaults
            .get(name)
            .cloned()
            .ok_or_else(|| SecurityFault::VaultUnavailable {
                vault: name.to_string(),
                reason: "no vault registered under this name".to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vaults.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

impl std::fmt::Debug for VaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultRegistry")
            .field("vaults", &self.names())
            .finish()
    }
}

/// Reveals plaintext of value nodes; ciphertext stays in the tree.
pub struct SecretService {
    vaults: VaultRegistry,
}

impl SecretService {
    pub fn new(vaults: VaultRegistry) -> Self {
        Self { vaults }
    }

    /// Plaintext of a value node. Unencrypted values are returned as stored.
    #[instrument(level = "debug", skip(self, config), fields(config = %config.id()))]
    pub fn reveal(&self, config: &Configuration, id: NodeId) -> ApplicationResult<String> {
        let node = config.tree().node(id)?;
        let value = node.as_value().ok_or_else(|| DomainError::UnsupportedOperation {
            kind: node.kind().name().to_string(),
            operation: "reveal".to_string(),
        })?;
        if !value.is_encrypted() {
            return Ok(value.value().to_string());
        }

        let vault_name = config.header().vault.as_deref();
        let vault = self.vaults.get(vault_name)?;
        let plaintext = vault.decrypt(value.value())?;
        if plaintext.is_empty() {
            return Err(SecurityFault::EmptyDecryption {
                vault: vault.name().to_string(),
            }
            .into());
        }
        value.value_type().check(&plaintext)?;
        debug!("reveal: decrypted {}", config.absolute_path(id)?);
        Ok(plaintext)
    }

    /// Plaintext of the single value addressed by `query`.
    pub fn reveal_query(&self, config: &Configuration, query: &str) -> ApplicationResult<String> {
        let id = config
            .find(query)?
            .and_then(|found| found.node())
            .ok_or_else(|| ApplicationError::Config {
                message: format!("'{}' does not address a single node", query),
            })?;
        self.reveal(config, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl Vault for Reverse {
        fn name(&self) -> &str {
            DEFAULT_VAULT
        }

        fn encrypt(&self, plaintext: &str) -> Result<String, SecurityFault> {
            Ok(plaintext.chars().rev().collect())
        }

        fn decrypt(&self, ciphertext: &str) -> Result<String, SecurityFault> {
            Ok(ciphertext.chars().rev().collect())
        }

        fn passcode(&self) -> Result<String, SecurityFault> {
            Ok("pass".to_string())
        }
    }

    #[test]
    fn test_registry_defaults_to_default_vault() {
        let registry = VaultRegistry::new().with(Arc::new(Reverse));
        assert_eq!(registry.get(None).unwrap().name(), DEFAULT_VAULT);
        assert!(matches!(
            registry.get(Some("hsm")),
            Err(SecurityFault::VaultUnavailable { .. })
        ));
    }
}
