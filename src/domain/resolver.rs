//! Query resolution over a [`ConfigTree`].
//!
//! Resolution walks the tokens produced by [`PathQuery::parse`]. A literal
//! token has to match the node it is applied to; wildcards fan out over the
//! regular children and recursive wildcards descend until the next token
//! addresses a child directly. Misses are `Ok(None)`, never errors.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::domain::arena::ConfigTree;
use crate::domain::error::DomainResult;
use crate::domain::node::NodeId;
use crate::domain::query::{Anchor, PathQuery, QuerySyntax};

/// Outcome of a successful query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    Node(NodeId),
    Many(SearchResult),
}

impl Found {
    fn from_matches(nodes: Vec<NodeId>) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => Some(Found::Node(nodes[0])),
            _ => Some(Found::Many(SearchResult { nodes })),
        }
    }

    /// The single matched node, `None` for multi-node results.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Found::Node(id) => Some(*id),
            Found::Many(_) => None,
        }
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Found::Node(id) => vec![*id],
            Found::Many(result) => result.nodes.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Found::Node(_) => 1,
            Found::Many(result) => result.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ephemeral set of nodes matched by one query.
///
/// Holds handles only; it offers no state transitions, so a search result
/// can never be marked loaded, updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    nodes: Vec<NodeId>,
}

impl SearchResult {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// Runs `query` from every member and aggregates the matches.
    pub fn find(&self, tree: &ConfigTree, query: &str) -> DomainResult<Option<Found>> {
        let resolver = PathResolver::new(tree);
        let parsed = PathQuery::parse(query, tree.syntax())?;
        let mut all = Vec::new();
        for member in &self.nodes {
            all.extend(resolver.resolve(*member, &parsed));
        }
        Ok(Found::from_matches(dedup(all)))
    }
}

impl IntoIterator for SearchResult {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Resolves path queries against one tree.
pub struct PathResolver<'a> {
    tree: &'a ConfigTree,
    syntax: &'a QuerySyntax,
}

impl<'a> PathResolver<'a> {
    pub fn new(tree: &'a ConfigTree) -> Self {
        Self {
            tree,
            syntax: tree.syntax(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn find(&self, start: NodeId, query: &str) -> DomainResult<Option<Found>> {
        let parsed = PathQuery::parse(query, self.syntax)?;
        let matches = dedup(self.resolve(start, &parsed));
        debug!("find: {} match(es) for '{}'", matches.len(), query);
        Ok(Found::from_matches(matches))
    }

    fn resolve(&self, start: NodeId, query: &PathQuery) -> Vec<NodeId> {
        let mut tokens = query.tokens.clone();
        let begin = match query.anchor {
            Anchor::Current => {
                if tokens.first() == Some(&self.syntax.current) {
                    match self.tree.effective_name(start) {
                        Some(name) => tokens[0] = name.to_string(),
                        None => return Vec::new(),
                    }
                }
                start
            }
            Anchor::RootAbsolute | Anchor::RootRelative => match self.tree.root() {
                Some(root) => root,
                None => return Vec::new(),
            },
        };

        if query.anchor == Anchor::RootRelative {
            let Some(root_name) = self.tree.effective_name(begin) else {
                return Vec::new();
            };
            tokens.insert(0, root_name.to_string());
        }
        if tokens.is_empty() {
            return vec![begin];
        }
        self.find_at(begin, &tokens, 0)
    }

    /// Applies `tokens[i]` to `node` itself.
    fn find_at(&self, node: NodeId, tokens: &[String], i: usize) -> Vec<NodeId> {
        let token = tokens[i].as_str();
        if self.syntax.is_parent(token) {
            return self.step_parent(node, tokens, i);
        }
        if self.syntax.is_recursive_wildcard(token) {
            return self.recursive(node, tokens, i);
        }
        if self.syntax.is_wildcard(token) || self.names(node, token) {
            return self.matched(node, tokens, i);
        }
        Vec::new()
    }

    /// `tokens[i]` has matched `node`; continue with the rest.
    fn matched(&self, node: NodeId, tokens: &[String], i: usize) -> Vec<NodeId> {
        let Some(next) = tokens.get(i + 1).map(String::as_str) else {
            return vec![node];
        };
        if self.syntax.is_parent(next) {
            return self.step_parent(node, tokens, i + 1);
        }
        if self.syntax.is_recursive_wildcard(next) {
            return self.recursive(node, tokens, i + 1);
        }
        if self.syntax.is_wildcard(next) {
            return self
                .tree
                .regular_children(node)
                .into_iter()
                .flat_map(|child| self.matched(child, tokens, i + 1))
                .collect();
        }
        match self.tree.child_by_token(node, next) {
            Some(child) => self.matched(child, tokens, i + 1),
            None => Vec::new(),
        }
    }

    /// `tokens[i]` is the parent operator applied at `node`.
    fn step_parent(&self, node: NodeId, tokens: &[String], i: usize) -> Vec<NodeId> {
        match self.tree.logical_parent(node) {
            Some(parent) => self.matched(parent, tokens, i),
            None => Vec::new(),
        }
    }

    /// `tokens[i]` is the recursive wildcard applied at `node`.
    fn recursive(&self, node: NodeId, tokens: &[String], i: usize) -> Vec<NodeId> {
        let Some(next) = tokens.get(i + 1).map(String::as_str) else {
            return vec![node];
        };
        if self.is_operator(next) {
            return self.matched(node, tokens, i);
        }
        if let Some(child) = self.tree.child_by_token(node, next) {
            return self.matched(child, tokens, i + 1);
        }
        self.tree
            .regular_children(node)
            .into_iter()
            .flat_map(|child| self.recursive(child, tokens, i))
            .collect()
    }

    fn names(&self, node: NodeId, token: &str) -> bool {
        if self.tree.effective_name(node) == Some(token) {
            return true;
        }
        // a reserved slot also answers to its abbreviation
        match (
            self.syntax.reserved_for_token(token),
            self.tree.get(node).and_then(|n| n.as_key_values()),
        ) {
            (Some(kind), Some(kv)) => kv.reserved_kind() == kind,
            _ => false,
        }
    }

    fn is_operator(&self, token: &str) -> bool {
        self.syntax.is_parent(token)
            || self.syntax.is_wildcard(token)
            || self.syntax.is_recursive_wildcard(token)
    }
}

fn dedup(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::with_capacity(nodes.len());
    nodes.into_iter().filter(|id| seen.insert(*id)).collect()
}

impl ConfigTree {
    /// Resolves `query` starting at `start`.
    pub fn find(&self, start: NodeId, query: &str) -> DomainResult<Option<Found>> {
        PathResolver::new(self).find(start, query)
    }

    /// Resolves `query` from the root.
    pub fn find_from_root(&self, query: &str) -> DomainResult<Option<Found>> {
        match self.root() {
            Some(root) => self.find(root, query),
            None => Ok(None),
        }
    }
}
