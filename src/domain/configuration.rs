//! Root aggregate: header identity, node tree and aggregate state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::domain::arena::ConfigTree;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{NodeId, ValueNode};
use crate::domain::resolver::Found;
use crate::domain::state::NodeState;
use crate::domain::validate::validate_tree;
use crate::domain::version::Version;

/// Identity and metadata declared by a configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigHeader {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub application: Option<String>,
    pub group: Option<String>,
    pub description: Option<String>,
    /// Name of the vault that decrypts this configuration's encrypted values.
    pub vault: Option<String>,
    /// Hex SHA-256 of the vault passcode the configuration was encrypted for.
    pub key_hash: Option<String>,
}

impl ConfigHeader {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version,
            application: None,
            group: None,
            description: None,
            vault: None,
            key_hash: None,
        }
    }
}

/// A loaded (or loading) configuration.
///
/// Once synced, a configuration is meant to be shared read-only behind an
/// `Arc`; reloading builds a new one.
#[derive(Debug, Clone)]
pub struct Configuration {
    header: ConfigHeader,
    tree: ConfigTree,
    state: NodeState,
    source: Option<PathBuf>,
    loaded_at: Option<DateTime<Utc>>,
}

impl Configuration {
    pub fn new(header: ConfigHeader, tree: ConfigTree) -> Self {
        Self {
            header,
            tree,
            state: NodeState::new(),
            source: None,
            loaded_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn version(&self) -> Version {
        self.header.version
    }

    pub fn header(&self) -> &ConfigHeader {
        &self.header
    }

    /// Splits a configuration into its header and node tree.
    pub fn into_parts(self) -> (ConfigHeader, ConfigTree) {
        (self.header, self.tree)
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut ConfigTree {
        &mut self.tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<PathBuf>) {
        self.source = Some(source.into());
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Resolves `query` from the root node.
    pub fn find(&self, query: &str) -> DomainResult<Option<Found>> {
        self.tree.find_from_root(query)
    }

    pub fn find_from(&self, start: NodeId, query: &str) -> DomainResult<Option<Found>> {
        self.tree.find(start, query)
    }

    /// Scalar addressed by `query`; `None` when the query misses or does not
    /// end at exactly one value node.
    pub fn value(&self, query: &str) -> DomainResult<Option<&ValueNode>> {
        let Some(found) = self.find(query)? else {
            return Ok(None);
        };
        Ok(found
            .node()
            .and_then(|id| self.tree.get(id))
            .and_then(|node| node.as_value()))
    }

    /// Every scalar matched by `query`, in match order.
    pub fn values(&self, query: &str) -> DomainResult<Vec<&ValueNode>> {
        let Some(found) = self.find(query)? else {
            return Ok(Vec::new());
        };
        Ok(found
            .nodes()
            .into_iter()
            .filter_map(|id| self.tree.get(id).and_then(|n| n.as_value()))
            .collect())
    }

    pub fn absolute_path(&self, id: NodeId) -> DomainResult<String> {
        self.tree.absolute_path(id)
    }

    /// Validates the tree and cascades `Synced` over every node.
    #[instrument(level = "debug", skip(self), fields(config = %self.header.id))]
    pub fn loaded(&mut self) -> DomainResult<()> {
        if self.state.is_error() {
            return Err(DomainError::InvalidState {
                state: self.state.state().to_string(),
                operation: "loaded".to_string(),
            });
        }
        let root = self
            .tree
            .root()
            .ok_or_else(|| DomainError::MissingRequired("root node".to_string()))?;
        validate_tree(&self.tree, root)?;
        self.tree.loaded(root)?;
        self.state.loaded()?;
        self.loaded_at = Some(Utc::now());
        debug!("loaded: {} nodes synced", self.tree.len());
        Ok(())
    }

    pub fn deleted(&mut self) -> bool {
        self.state.deleted()
    }

    /// Marks the configuration failed; the tree keeps its node states.
    pub fn set_error(&mut self, fault: impl std::fmt::Display) {
        self.state.set_error(fault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{ConfigNode, NodeKind};
    use crate::domain::state::State;

    fn configuration() -> Configuration {
        let mut tree = ConfigTree::default();
        let root = tree.insert(ConfigNode::new(NodeKind::path(), "orders"));
        tree.set_name(root, "orders").unwrap();
        tree.set_root(root).unwrap();
        let timeout = tree.insert(ConfigNode::new(NodeKind::value("30"), "orders"));
        tree.set_name(timeout, "timeout").unwrap();
        tree.add_child(root, timeout).unwrap();
        Configuration::new(ConfigHeader::new("orders", Version::new(1, 3, 0)), tree)
    }

    #[test]
    fn test_configuration_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Configuration>();
    }

    #[test]
    fn test_value_lookup() {
        let config = configuration();
        let value = config.value("/orders/timeout").unwrap().unwrap();
        assert_eq!(value.as_i64().unwrap(), 30);
        assert!(config.value("/orders/missing").unwrap().is_none());
    }

    #[test]
    fn test_loaded_sets_timestamp_and_state() {
        let mut config = configuration();
        config.loaded().unwrap();
        assert_eq!(config.state().state(), State::Synced);
        assert!(config.loaded_at().is_some());
        let root = config.root().unwrap();
        assert!(config.tree().node(root).unwrap().state().is_synced());
    }

    #[test]
    fn test_loaded_after_error_fails() {
        let mut config = configuration();
        config.set_error("reader failed");
        assert!(config.loaded().is_err());
        assert_eq!(config.state().fault(), Some("reader failed"));
    }
}
