//! Completeness checks run before a configuration is marked synced.

use tracing::instrument;

use crate::domain::arena::ConfigTree;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{
    IncludeNode, KeyValueNode, ListElementNode, ListValueNode, NodeId, NodeKind, PathNode,
    ResourceNode, ValueNode, ValueType,
};

/// Per-variant validation; `path` is the node's absolute path for reporting.
pub trait Validate {
    fn validate(&self, path: &str) -> DomainResult<()>;
}

impl Validate for ValueNode {
    fn validate(&self, path: &str) -> DomainResult<()> {
        if self.required && self.value.trim().is_empty() {
            return Err(DomainError::MissingRequired(path.to_string()));
        }
        // ciphertext is only checked after decryption
        if self.encrypted || self.value_type == ValueType::String {
            return Ok(());
        }
        if self.value.is_empty() && !self.required {
            return Ok(());
        }
        self.value_type.check(&self.value)
    }
}

impl Validate for IncludeNode {
    fn validate(&self, path: &str) -> DomainResult<()> {
        let missing = if self.root.is_none() {
            Some("no embedded configuration")
        } else if self.resolved_version.is_none() {
            Some("version not resolved")
        } else if self.resolved_reader.is_none() {
            Some("reader not resolved")
        } else {
            None
        };
        match missing {
            Some(reason) => Err(DomainError::UnresolvedInclude {
                path: path.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Validate for ResourceNode {
    fn validate(&self, path: &str) -> DomainResult<()> {
        if self.handle.is_none() {
            return Err(DomainError::UnresolvedResource {
                path: path.to_string(),
                reason: format!("'{}' was not resolved", self.descriptor.location),
            });
        }
        Ok(())
    }
}

impl Validate for PathNode {
    fn validate(&self, _path: &str) -> DomainResult<()> {
        Ok(())
    }
}

impl Validate for KeyValueNode {
    fn validate(&self, _path: &str) -> DomainResult<()> {
        Ok(())
    }
}

impl Validate for ListValueNode {
    fn validate(&self, _path: &str) -> DomainResult<()> {
        Ok(())
    }
}

impl Validate for ListElementNode {
    fn validate(&self, _path: &str) -> DomainResult<()> {
        Ok(())
    }
}

impl Validate for NodeKind {
    fn validate(&self, path: &str) -> DomainResult<()> {
        match self {
            NodeKind::Path(n) => n.validate(path),
            NodeKind::Value(n) => n.validate(path),
            NodeKind::ListValue(n) => n.validate(path),
            NodeKind::ListElement(n) => n.validate(path),
            NodeKind::KeyValue(n) => n.validate(path),
            NodeKind::Include(n) => n.validate(path),
            NodeKind::Resource(n) => n.validate(path),
        }
    }
}

/// Validates the subtree rooted at `root`, stopping at the first fault.
#[instrument(level = "debug", skip(tree))]
pub fn validate_tree(tree: &ConfigTree, root: NodeId) -> DomainResult<()> {
    for id in tree.subtree(root) {
        let path = tree.absolute_path(id)?;
        tree.node(id)?.kind().validate(&path)?;
    }
    Ok(())
}

/// Checks only the links: includes and resources. Value checks wait until
/// interpolation has run.
#[instrument(level = "debug", skip(tree))]
pub fn validate_structure(tree: &ConfigTree, root: NodeId) -> DomainResult<()> {
    for id in tree.subtree(root) {
        match tree.node(id)?.kind() {
            NodeKind::Include(n) => n.validate(&tree.absolute_path(id)?)?,
            NodeKind::Resource(n) => n.validate(&tree.absolute_path(id)?)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::ConfigNode;

    #[test]
    fn test_required_value_must_be_present() {
        let mut v = ValueNode::new("");
        v.required = true;
        assert_eq!(
            v.validate("/app/key"),
            Err(DomainError::MissingRequired("/app/key".into()))
        );
    }

    #[test]
    fn test_declared_type_is_checked_unless_encrypted() {
        let mut v = ValueNode::typed("abc", ValueType::Int);
        assert!(matches!(
            v.validate("/app/n"),
            Err(DomainError::TypeCoercion { .. })
        ));
        v.encrypted = true;
        assert!(v.validate("/app/n").is_ok());
    }

    #[test]
    fn test_list_elements_pass_with_positional_names() {
        let mut tree = ConfigTree::default();
        let root = tree.insert(ConfigNode::new(NodeKind::path(), "t"));
        tree.set_name(root, "app").unwrap();
        tree.set_root(root).unwrap();
        let list = tree.insert(ConfigNode::new(NodeKind::list_values(), "t"));
        tree.set_name(list, "hosts").unwrap();
        tree.add_child(root, list).unwrap();
        let element = tree.insert(ConfigNode::new(NodeKind::value("a"), "t"));
        tree.push_element(list, element).unwrap();

        assert!(validate_tree(&tree, root).is_ok());
    }

    #[test]
    fn test_structure_check_ignores_unchecked_values() {
        let mut tree = ConfigTree::default();
        let root = tree.insert(ConfigNode::new(NodeKind::path(), "t"));
        tree.set_name(root, "app").unwrap();
        tree.set_root(root).unwrap();
        let port = tree.insert(ConfigNode::new(
            NodeKind::Value(ValueNode::typed("${port}", ValueType::Int)),
            "t",
        ));
        tree.set_name(port, "port").unwrap();
        tree.add_child(root, port).unwrap();

        assert!(validate_structure(&tree, root).is_ok());
        assert!(validate_tree(&tree, root).is_err());
    }
}
