//! Tree construction contract used by format readers.
//!
//! A reader announces the document header with [`ConfigBuilder::begin`] and
//! then constructs nodes top-down. Include and resource nodes are recorded
//! while constructing and resolved afterwards by the loader.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    ConfigHeader, ConfigNode, ConfigTree, Configuration, DomainError, DomainResult,
    IncludeDescriptor, NodeId, NodeKind, NodeSource, QuerySyntax, ReservedKind, ResourceKind,
    SameMajorPolicy, ValueNode, ValueType, VersionPolicy,
};
use crate::infrastructure::traits::FileSystem;

/// Produces the fully loaded configuration an include refers to.
pub trait IncludeResolver {
    fn resolve(&mut self, descriptor: &IncludeDescriptor) -> ApplicationResult<Configuration>;
}

pub struct ConfigBuilder {
    header: Option<ConfigHeader>,
    tree: ConfigTree,
    policy: Arc<dyn VersionPolicy>,
    includes: Vec<NodeId>,
    resources: Vec<NodeId>,
}

impl ConfigBuilder {
    pub fn new(syntax: QuerySyntax) -> Self {
        Self {
            header: None,
            tree: ConfigTree::new(syntax),
            policy: Arc::new(SameMajorPolicy),
            includes: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn VersionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn syntax(&self) -> &QuerySyntax {
        self.tree.syntax()
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Sets the identity every constructed node is stamped with.
    pub fn begin(&mut self, header: ConfigHeader) -> DomainResult<()> {
        if header.id.trim().is_empty() {
            return Err(DomainError::InvalidName {
                name: header.id,
                reason: "configuration id must not be empty".to_string(),
            });
        }
        self.header = Some(header);
        Ok(())
    }

    pub fn header(&self) -> Option<&ConfigHeader> {
        self.header.as_ref()
    }

    fn config_id(&self) -> DomainResult<String> {
        self.header
            .as_ref()
            .map(|h| h.id.clone())
            .ok_or_else(|| DomainError::MissingRequired("configuration header".to_string()))
    }

    /// Creates a node and attaches it below `parent`, or makes it the root.
    ///
    /// List elements get their positional name on attachment, so `name` may
    /// be `None` for them.
    pub fn construct(
        &mut self,
        kind: NodeKind,
        name: Option<&str>,
        parent: Option<NodeId>,
    ) -> DomainResult<NodeId> {
        let owner = self.config_id()?;
        if parent.is_none() {
            if self.tree.root().is_some() {
                return Err(DomainError::UnsupportedOperation {
                    kind: kind.name().to_string(),
                    operation: "second root node".to_string(),
                });
            }
            if name.is_none() {
                return Err(DomainError::UnnamedNode);
            }
        }

        let id = self.tree.insert(ConfigNode::new(kind, owner));
        if let Some(name) = name {
            self.tree.set_name(id, name)?;
        }
        match parent {
            Some(parent) => self.attach(parent, id)?,
            None => self.tree.set_root(id)?,
        }

        let node = self.tree.node(id)?;
        if node.as_include().is_some() {
            self.includes.push(id);
        } else if node.as_resource().is_some() {
            self.resources.push(id);
        }
        Ok(id)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) -> DomainResult<()> {
        match self.tree.node(parent)?.kind() {
            NodeKind::Path(_) => self.tree.add_child(parent, child),
            NodeKind::ListValue(_) | NodeKind::ListElement(_) => {
                self.tree.push_element(parent, child).map(|_| ())
            }
            NodeKind::KeyValue(_) => self.tree.put_entry(parent, child),
            other => Err(DomainError::UnsupportedOperation {
                kind: other.name().to_string(),
                operation: "attach child".to_string(),
            }),
        }
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> DomainResult<()> {
        self.tree.add_child(parent, child)
    }

    pub fn push_element(&mut self, list: NodeId, element: NodeId) -> DomainResult<usize> {
        self.tree.push_element(list, element)
    }

    pub fn put_entry(&mut self, kv: NodeId, value: NodeId) -> DomainResult<()> {
        self.tree.put_entry(kv, value)
    }

    pub fn reserved_slot(&mut self, path: NodeId, kind: ReservedKind) -> DomainResult<NodeId> {
        self.tree.reserved_slot(path, kind)
    }

    pub fn set_node_source(&mut self, id: NodeId, source: NodeSource) -> DomainResult<()> {
        self.tree.node_mut(id)?.source = source;
        Ok(())
    }

    pub fn set_encrypted(&mut self, id: NodeId, encrypted: bool) -> DomainResult<()> {
        self.value_mut(id, |v| v.encrypted = encrypted)
    }

    pub fn set_value_type(&mut self, id: NodeId, value_type: ValueType) -> DomainResult<()> {
        self.value_mut(id, |v| v.value_type = value_type)
    }

    pub fn set_required(&mut self, id: NodeId, required: bool) -> DomainResult<()> {
        self.value_mut(id, |v| v.required = required)
    }

    fn value_mut(
        &mut self,
        id: NodeId,
        update: impl FnOnce(&mut ValueNode),
    ) -> DomainResult<()> {
        match &mut self.tree.node_mut(id)?.kind {
            NodeKind::Value(v) => {
                update(v);
                Ok(())
            }
            other => Err(DomainError::UnsupportedOperation {
                kind: other.name().to_string(),
                operation: "set value attribute".to_string(),
            }),
        }
    }

    /// Include nodes constructed so far, in document order.
    pub fn pending_includes(&self) -> Vec<NodeId> {
        self.includes.clone()
    }

    pub fn pending_resources(&self) -> Vec<NodeId> {
        self.resources.clone()
    }

    /// Loads the configuration behind an include node and splices its tree
    /// in below the include.
    #[instrument(level = "debug", skip(self, resolver))]
    pub fn resolve_include(
        &mut self,
        id: NodeId,
        resolver: &mut dyn IncludeResolver,
    ) -> ApplicationResult<()> {
        let descriptor = self
            .tree
            .node(id)?
            .as_include()
            .map(|inc| inc.descriptor().clone())
            .ok_or_else(|| DomainError::UnsupportedOperation {
                kind: "non-include".to_string(),
                operation: "resolve_include".to_string(),
            })?;
        let owner = self.config_id()?;
        let path = self.tree.absolute_path(id)?;

        let included = resolver.resolve(&descriptor)?;
        if included.name() != descriptor.config_name {
            return Err(DomainError::UnresolvedInclude {
                path,
                reason: format!(
                    "expected configuration '{}', found '{}'",
                    descriptor.config_name,
                    included.name()
                ),
            }
            .into());
        }
        let actual = included.version();
        if !self.policy.is_compatible(&descriptor.version, &actual) {
            return Err(DomainError::IncompatibleVersion {
                name: descriptor.config_name.clone(),
                required: descriptor.version.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        let (_, included_tree) = included.into_parts();
        let embedded = self.tree.graft(included_tree, &owner)?;
        self.tree.embed(id, embedded)?;
        if let NodeKind::Include(inc) = &mut self.tree.node_mut(id)?.kind {
            inc.resolved_version = Some(actual);
            inc.resolved_reader = Some(descriptor.reader.clone());
        }
        debug!(
            "resolve_include: {} -> {} v{}",
            path, descriptor.config_name, actual
        );
        Ok(())
    }

    /// Resolves a resource location against `base_dir` to a canonical path.
    #[instrument(level = "debug", skip(self, fs))]
    pub fn resolve_resource(
        &mut self,
        id: NodeId,
        base_dir: &Path,
        fs: &dyn FileSystem,
    ) -> ApplicationResult<()> {
        let descriptor = self
            .tree
            .node(id)?
            .as_resource()
            .map(|res| res.descriptor().clone())
            .ok_or_else(|| DomainError::UnsupportedOperation {
                kind: "non-resource".to_string(),
                operation: "resolve_resource".to_string(),
            })?;
        let node_path = self.tree.absolute_path(id)?;

        let location = shellexpand::full(&descriptor.location)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| descriptor.location.clone());
        let candidate = {
            let p = PathBuf::from(&location);
            if p.is_absolute() {
                p
            } else {
                base_dir.join(p)
            }
        };

        let unresolved = |reason: String| -> ApplicationError {
            DomainError::UnresolvedResource {
                path: node_path.clone(),
                reason,
            }
            .into()
        };
        let handle = fs
            .canonicalize(&candidate)
            .map_err(|e| unresolved(format!("{}: {}", candidate.display(), e)))?;
        let kind_ok = match descriptor.kind {
            ResourceKind::File => fs.is_file(&handle),
            ResourceKind::Directory => fs.is_dir(&handle),
        };
        if !kind_ok {
            return Err(unresolved(format!(
                "{} is not a {:?}",
                handle.display(),
                descriptor.kind
            )));
        }

        if let NodeKind::Resource(res) = &mut self.tree.node_mut(id)?.kind {
            res.handle = Some(handle);
        }
        Ok(())
    }

    /// Hands over the built tree as a configuration in `Loading` state.
    pub fn finish(self) -> DomainResult<Configuration> {
        let header = self
            .header
            .ok_or_else(|| DomainError::MissingRequired("configuration header".to_string()))?;
        if self.tree.root().is_none() {
            return Err(DomainError::MissingRequired(format!(
                "root node of '{}'",
                header.id
            )));
        }
        Ok(Configuration::new(header, self.tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{State, Version};

    fn builder() -> ConfigBuilder {
        let mut b = ConfigBuilder::new(QuerySyntax::default());
        b.begin(ConfigHeader::new("orders", Version::new(1, 0, 0)))
            .unwrap();
        b
    }

    #[test]
    fn test_construct_requires_header() {
        let mut b = ConfigBuilder::new(QuerySyntax::default());
        assert!(b.construct(NodeKind::path(), Some("x"), None).is_err());
    }

    #[test]
    fn test_construct_stamps_configuration_and_loading_state() {
        let mut b = builder();
        let root = b.construct(NodeKind::path(), Some("orders"), None).unwrap();
        let node = b.tree().node(root).unwrap();
        assert_eq!(node.configuration(), "orders");
        assert_eq!(node.state().state(), State::Loading);
    }

    #[test]
    fn test_second_root_is_rejected() {
        let mut b = builder();
        b.construct(NodeKind::path(), Some("a"), None).unwrap();
        assert!(b.construct(NodeKind::path(), Some("b"), None).is_err());
    }

    #[test]
    fn test_list_elements_are_named_by_index() {
        let mut b = builder();
        let root = b.construct(NodeKind::path(), Some("orders"), None).unwrap();
        let list = b
            .construct(NodeKind::list_values(), Some("hosts"), Some(root))
            .unwrap();
        b.construct(NodeKind::value("a"), None, Some(list)).unwrap();
        let second = b.construct(NodeKind::value("b"), None, Some(list)).unwrap();
        assert_eq!(
            b.tree().absolute_path(second).unwrap(),
            "/orders/hosts/1"
        );
    }

    #[test]
    fn test_set_encrypted_on_path_node_fails() {
        let mut b = builder();
        let root = b.construct(NodeKind::path(), Some("orders"), None).unwrap();
        assert!(b.set_encrypted(root, true).is_err());
    }

    #[test]
    fn test_finish_without_root_fails() {
        assert!(builder().finish().is_err());
    }
}
