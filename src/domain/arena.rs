use std::collections::HashMap;

use generational_arena::Arena;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{Children, ConfigNode, NodeId, NodeKind, ReservedKind};
use crate::domain::query::QuerySyntax;
use crate::domain::state::State;

/// Arena-based configuration tree.
///
/// Uses a generational arena for memory-safe node handles: nodes are owned
/// by the arena, parent/child links are [`NodeId`]s. Removing a subtree frees
/// its slots, so stale handles are detected instead of dangling.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    arena: Arena<ConfigNode>,
    root: Option<NodeId>,
    syntax: QuerySyntax,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new(QuerySyntax::default())
    }
}

impl ConfigTree {
    pub fn new(syntax: QuerySyntax) -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            syntax,
        }
    }

    pub fn syntax(&self) -> &QuerySyntax {
        &self.syntax
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id.0)
    }

    pub fn get(&self, id: NodeId) -> Option<&ConfigNode> {
        self.arena.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> DomainResult<&ConfigNode> {
        self.arena.get(id.0).ok_or(DomainError::StaleHandle)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> DomainResult<&mut ConfigNode> {
        self.arena.get_mut(id.0).ok_or(DomainError::StaleHandle)
    }

    /// Stores an unattached node and returns its handle.
    #[instrument(level = "trace", skip(self, node))]
    pub fn insert(&mut self, node: ConfigNode) -> NodeId {
        NodeId(self.arena.insert(node))
    }

    /// Makes an unattached node the root of this tree.
    pub fn set_root(&mut self, id: NodeId) -> DomainResult<()> {
        let node = self.node(id)?;
        if node.parent.is_some() {
            return Err(DomainError::UnsupportedOperation {
                kind: node.kind.name().to_string(),
                operation: "set_root on an attached node".to_string(),
            });
        }
        self.root = Some(id);
        Ok(())
    }

    /// Assigns a validated name to a node that is not attached yet.
    pub fn set_name(&mut self, id: NodeId, name: &str) -> DomainResult<()> {
        let node = self.node(id)?;
        self.syntax.validate_name(name, &node.kind)?;
        if node.parent.is_some() {
            return Err(DomainError::UnsupportedOperation {
                kind: node.kind.name().to_string(),
                operation: "rename attached node".to_string(),
            });
        }
        self.node_mut(id)?.name = Some(name.to_string());
        Ok(())
    }

    /// Attaches `child` under the path node `parent`, replacing any same-named
    /// child. Key/value nodes land in their reserved slot.
    #[instrument(level = "debug", skip(self))]
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> DomainResult<()> {
        if parent == child {
            return Err(DomainError::UnsupportedOperation {
                kind: "path".to_string(),
                operation: "attach node to itself".to_string(),
            });
        }
        self.ensure_not_ancestor(child, parent)?;
        let child_node = self.node(child)?;
        let name = child_node.name.clone().ok_or(DomainError::UnnamedNode)?;
        let reserved = child_node.as_key_values().map(|kv| kv.kind);
        if self.node(parent)?.as_path().is_none() {
            return Err(self.unsupported(parent, "add_child"));
        }

        self.detach(child)?;
        let replaced = match &mut self.node_mut(parent)?.kind {
            NodeKind::Path(p) => match reserved {
                Some(kind) => p.reserved_mut(kind).replace(child),
                None => p.children.insert(name, child),
            },
            _ => None,
        };
        if let Some(old) = replaced.filter(|old| *old != child) {
            debug!("add_child: replacing existing child");
            self.free_subtree(old);
        }
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.state.updated();
        Ok(())
    }

    /// Detaches and frees the child named `name`. Reserved slots are addressed
    /// by literal name or abbreviation.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> DomainResult<bool> {
        let reserved = self.syntax.reserved_for_token(name);
        let node = self.node(parent)?;
        if node.as_path().is_none() && node.as_key_values().is_none() {
            return Err(self.unsupported(parent, "remove_child"));
        }
        let removed = match &mut self.node_mut(parent)?.kind {
            NodeKind::Path(p) => match reserved {
                Some(kind) => p.reserved_mut(kind).take(),
                None => p.children.shift_remove(name),
            },
            NodeKind::KeyValue(kv) => kv.entries.shift_remove(name),
            _ => None,
        };
        match removed {
            Some(id) => {
                self.free_subtree(id);
                self.node_mut(parent)?.state.updated();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Appends a node to a list; it is named by its position.
    pub fn push_element(&mut self, list: NodeId, element: NodeId) -> DomainResult<usize> {
        let element_ok = {
            let el = self.node(element)?;
            match &self.node(list)?.kind {
                NodeKind::ListValue(_) => el.as_value().is_some(),
                NodeKind::ListElement(_) => el.as_path().is_some(),
                _ => return Err(self.unsupported(list, "push_element")),
            }
        };
        if !element_ok {
            return Err(DomainError::UnsupportedOperation {
                kind: self.node(element)?.kind.name().to_string(),
                operation: "push into a list of a different element kind".to_string(),
            });
        }

        self.detach(element)?;
        let index = match &mut self.node_mut(list)?.kind {
            NodeKind::ListValue(l) => {
                l.values.push(element);
                l.values.len() - 1
            }
            NodeKind::ListElement(l) => {
                l.elements.push(element);
                l.elements.len() - 1
            }
            _ => 0,
        };
        let node = self.node_mut(element)?;
        node.name = Some(index.to_string());
        node.parent = Some(list);
        self.node_mut(list)?.state.updated();
        Ok(index)
    }

    /// Inserts or replaces a value node in a key/value node under its name.
    pub fn put_entry(&mut self, kv: NodeId, value: NodeId) -> DomainResult<()> {
        let value_node = self.node(value)?;
        if value_node.as_value().is_none() {
            return Err(self.unsupported(value, "put_entry"));
        }
        let key = value_node.name.clone().ok_or(DomainError::UnnamedNode)?;
        if self.node(kv)?.as_key_values().is_none() {
            return Err(self.unsupported(kv, "put_entry"));
        }

        self.detach(value)?;
        let replaced = match &mut self.node_mut(kv)?.kind {
            NodeKind::KeyValue(map) => map.entries.insert(key, value),
            _ => None,
        };
        if let Some(old) = replaced.filter(|old| *old != value) {
            self.free_subtree(old);
        }
        self.node_mut(value)?.parent = Some(kv);
        self.node_mut(kv)?.state.updated();
        Ok(())
    }

    /// Returns the reserved sub-node of a path node, creating it on first use.
    pub fn reserved_slot(&mut self, path: NodeId, kind: ReservedKind) -> DomainResult<NodeId> {
        let parent = self.node(path)?;
        let Some(p) = parent.as_path() else {
            return Err(self.unsupported(path, "reserved_slot"));
        };
        if let Some(existing) = p.reserved(kind) {
            return Ok(existing);
        }
        let mut node = ConfigNode::new(NodeKind::key_values(kind), parent.configuration.clone());
        node.name = Some(self.syntax.reserved_name(kind).to_string());
        let id = self.insert(node);
        self.add_child(path, id)?;
        Ok(id)
    }

    /// Updates a scalar's value, marking it `Updated` when it was synced.
    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) -> DomainResult<()> {
        if self.node(id)?.as_value().is_none() {
            return Err(self.unsupported(id, "set_value"));
        }
        let node = self.node_mut(id)?;
        let value = value.into();
        if let NodeKind::Value(v) = &mut node.kind {
            if v.value != value {
                v.value = value;
                node.state.updated();
            }
        }
        Ok(())
    }

    /// Name under which the node answers during resolution: an embedded
    /// include root answers to its include's name.
    pub fn effective_name(&self, id: NodeId) -> Option<&str> {
        let node = self.get(id)?;
        match node.parent.and_then(|p| self.get(p)) {
            Some(parent) if parent.as_include().is_some() => parent.name(),
            _ => node.name(),
        }
    }

    /// Parent for navigation purposes, skipping the include wrapper of an
    /// embedded root.
    pub fn logical_parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent?;
        match self.get(parent) {
            Some(p) if p.as_include().is_some() => p.parent,
            _ => Some(parent),
        }
    }

    /// Maps a resolved include to its embedded root.
    pub fn delegate(&self, id: NodeId) -> NodeId {
        self.get(id)
            .and_then(ConfigNode::as_include)
            .and_then(|inc| inc.root)
            .unwrap_or(id)
    }

    /// Child addressed by a single query token.
    pub fn child_by_token(&self, id: NodeId, token: &str) -> Option<NodeId> {
        let node = self.get(self.delegate(id))?;
        match &node.kind {
            NodeKind::Path(p) => match self.syntax.reserved_for_token(token) {
                Some(kind) => p.reserved(kind),
                None => p.child(token),
            },
            NodeKind::KeyValue(kv) => kv.get(token),
            NodeKind::ListValue(l) => token.parse::<usize>().ok().and_then(|i| l.get(i)),
            NodeKind::ListElement(l) => token.parse::<usize>().ok().and_then(|i| l.get(i)),
            NodeKind::Include(_) | NodeKind::Value(_) | NodeKind::Resource(_) => None,
        }
    }

    /// Children visited by wildcard fan-out.
    pub fn regular_children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(self.delegate(id))
            .map(|n| n.kind.regular())
            .unwrap_or_default()
    }

    pub fn absolute_path(&self, id: NodeId) -> DomainResult<String> {
        self.path_of(id, false)
    }

    /// Like [`absolute_path`](Self::absolute_path) but reserved key/value
    /// nodes contribute their one-character abbreviation.
    pub fn search_path(&self, id: NodeId) -> DomainResult<String> {
        self.path_of(id, true)
    }

    fn path_of(&self, id: NodeId, abbreviate: bool) -> DomainResult<String> {
        let mut segments: Vec<String> = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let node = self.node(cid)?;
            if let Some(pid) = node.parent {
                // an embedded include root shares the include's path
                if self.node(pid)?.as_include().is_some() {
                    current = Some(pid);
                    continue;
                }
            }
            let name = node.name().ok_or(DomainError::UnnamedNode)?;
            let segment = match (&node.kind, abbreviate) {
                (NodeKind::KeyValue(kv), true) => self.syntax.abbreviation(kv.kind).to_string(),
                _ => name.to_string(),
            };
            segments.push(segment);
            current = node.parent;
        }
        let sep = self.syntax.separator.to_string();
        Ok(format!("{}{}", sep, segments.iter().rev().join(&sep)))
    }

    /// All handles of the subtree rooted at `id`, pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                out.push(current);
                for child in node.kind.owned().into_iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Cascades `Synced` over the subtree. Fails without changing anything
    /// when any node of the subtree is in `Error`.
    #[instrument(level = "debug", skip(self))]
    pub fn loaded(&mut self, id: NodeId) -> DomainResult<()> {
        let ids = self.subtree(id);
        for nid in &ids {
            let node = self.node(*nid)?;
            if node.state.is_error() {
                return Err(DomainError::InvalidState {
                    state: State::Error.to_string(),
                    operation: format!(
                        "loaded ({})",
                        self.absolute_path(*nid)
                            .unwrap_or_else(|_| node.kind.name().to_string())
                    ),
                });
            }
        }
        for nid in ids {
            self.node_mut(nid)?.state.loaded()?;
        }
        Ok(())
    }

    /// Forces the whole subtree back to `Loading`.
    pub fn loading(&mut self, id: NodeId) -> DomainResult<()> {
        for nid in self.subtree(id) {
            self.node_mut(nid)?.state.loading();
        }
        Ok(())
    }

    pub fn updated(&mut self, id: NodeId) -> DomainResult<()> {
        self.node_mut(id)?.state.updated();
        Ok(())
    }

    pub fn deleted(&mut self, id: NodeId) -> DomainResult<bool> {
        Ok(self.node_mut(id)?.state.deleted())
    }

    pub fn set_error(&mut self, id: NodeId, fault: impl std::fmt::Display) -> DomainResult<()> {
        self.node_mut(id)?.state.set_error(fault);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        if let Some(root) = self.root {
            self.calculate_depth(root)
        } else {
            0
        }
    }

    fn calculate_depth(&self, id: NodeId) -> usize {
        if let Some(node) = self.get(id) {
            1 + node
                .kind
                .owned()
                .into_iter()
                .map(|child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Moves the whole tree of `other` into this arena, stamping every moved
    /// node with `owner`. Returns the new handle of `other`'s root, unattached.
    #[instrument(level = "debug", skip(self, other))]
    pub(crate) fn graft(&mut self, mut other: ConfigTree, owner: &str) -> DomainResult<NodeId> {
        let other_root = other.root.ok_or_else(|| DomainError::UnresolvedInclude {
            path: owner.to_string(),
            reason: "included configuration has no root".to_string(),
        })?;

        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        for old in other.subtree(other_root) {
            let node = other.arena.remove(old.0).ok_or(DomainError::StaleHandle)?;
            mapping.insert(old, self.insert(node));
        }
        for new in mapping.values() {
            let node = self.node_mut(*new)?;
            node.configuration = owner.to_string();
            node.parent = node.parent.and_then(|p| mapping.get(&p).copied());
            node.kind.remap_ids(|id| mapping.get(&id).copied());
        }
        debug!("graft: moved {} nodes", mapping.len());
        mapping
            .get(&other_root)
            .copied()
            .ok_or(DomainError::StaleHandle)
    }

    /// Links an embedded root under its include node.
    pub(crate) fn embed(&mut self, include: NodeId, root: NodeId) -> DomainResult<()> {
        if self.node(include)?.as_include().is_none() {
            return Err(self.unsupported(include, "embed"));
        }
        let previous = match &mut self.node_mut(include)?.kind {
            NodeKind::Include(inc) => inc.root.replace(root),
            _ => None,
        };
        if let Some(old) = previous.filter(|old| *old != root) {
            self.free_subtree(old);
        }
        self.node_mut(root)?.parent = Some(include);
        self.node_mut(include)?.state.updated();
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> DomainResult<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        if let Some(parent_node) = self.arena.get_mut(parent.0) {
            match &mut parent_node.kind {
                NodeKind::Path(p) => {
                    p.children.retain(|_, c| *c != id);
                    for kind in ReservedKind::ALL {
                        let slot = p.reserved_mut(kind);
                        if *slot == Some(id) {
                            *slot = None;
                        }
                    }
                }
                NodeKind::KeyValue(kv) => kv.entries.retain(|_, c| *c != id),
                NodeKind::ListValue(l) => l.values.retain(|c| *c != id),
                NodeKind::ListElement(l) => l.elements.retain(|c| *c != id),
                NodeKind::Include(inc) => {
                    if inc.root == Some(id) {
                        inc.root = None;
                    }
                }
                NodeKind::Value(_) | NodeKind::Resource(_) => {}
            }
            parent_node.state.updated();
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    fn ensure_not_ancestor(&self, candidate: NodeId, of: NodeId) -> DomainResult<()> {
        let mut current = Some(of);
        while let Some(cid) = current {
            if cid == candidate {
                return Err(DomainError::UnsupportedOperation {
                    kind: "path".to_string(),
                    operation: "attach an ancestor below its descendant".to_string(),
                });
            }
            current = self.get(cid).and_then(|n| n.parent);
        }
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        for nid in self.subtree(id) {
            self.arena.remove(nid.0);
        }
        if self.root == Some(id) {
            self.root = None;
        }
    }

    fn unsupported(&self, id: NodeId, operation: &str) -> DomainError {
        match self.get(id) {
            Some(node) => DomainError::UnsupportedOperation {
                kind: node.kind.name().to_string(),
                operation: operation.to_string(),
            },
            None => DomainError::StaleHandle,
        }
    }
}

/// Pre-order iterator over the nodes reachable from the root.
pub struct TreeIterator<'a> {
    tree: &'a ConfigTree,
    stack: Vec<NodeId>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a ConfigTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push(root);
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (NodeId, &'a ConfigNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.tree.get(current) {
                // Push children in reverse order for left-to-right traversal
                for child in node.kind.owned().into_iter().rev() {
                    self.stack.push(child);
                }
                return Some((current, node));
            }
        }
        None
    }
}

/// Post-order iterator: children before their parent.
pub struct PostOrderIterator<'a> {
    tree: &'a ConfigTree,
    stack: Vec<(NodeId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(tree: &'a ConfigTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push((root, false));
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (NodeId, &'a ConfigNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.get(current) {
                if visited {
                    return Some((current, node));
                }
                self.stack.push((current, true));
                for child in node.kind.owned().into_iter().rev() {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}
