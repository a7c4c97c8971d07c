//! `${name}` substitution over a configuration tree.
//!
//! Names resolve against the properties in scope (own properties override
//! inherited ones), then the process environment. Unknown names stay as
//! written. Substitution is a single pass: replacement text is not scanned
//! again.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::{debug, instrument};

use crate::domain::{Children, ConfigTree, Configuration, DomainResult, NodeId, ReservedKind};

type Scope = HashMap<String, String>;

fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex pattern"))
}

#[derive(Debug, Clone)]
pub struct VariableInterpolator {
    use_env: bool,
}

impl Default for VariableInterpolator {
    fn default() -> Self {
        Self { use_env: true }
    }
}

impl VariableInterpolator {
    pub fn new(use_env: bool) -> Self {
        Self { use_env }
    }

    /// Substitutes markers in every non-encrypted value of the configuration.
    /// Returns the number of values changed.
    #[instrument(level = "debug", skip(self, config), fields(config = %config.id()))]
    pub fn interpolate(&self, config: &mut Configuration) -> DomainResult<usize> {
        let Some(root) = config.root() else {
            return Ok(0);
        };
        let mut changed = 0;
        self.visit(config.tree_mut(), root, &Scope::new(), &mut changed)?;
        debug!("interpolate: {} value(s) changed", changed);
        Ok(changed)
    }

    /// Replaces the markers of a single string.
    pub fn substitute(&self, text: &str, scope: &HashMap<String, String>) -> String {
        marker()
            .replace_all(text, |caps: &Captures| {
                let name = caps[1].trim();
                scope
                    .get(name)
                    .cloned()
                    .or_else(|| self.env(name))
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn env(&self, name: &str) -> Option<String> {
        if self.use_env {
            std::env::var(name).ok()
        } else {
            None
        }
    }

    fn visit(
        &self,
        tree: &mut ConfigTree,
        id: NodeId,
        scope: &Scope,
        changed: &mut usize,
    ) -> DomainResult<()> {
        let node = tree.node(id)?;
        if node.as_value().is_some() {
            return self.value(tree, id, scope, changed);
        }
        let children = node.kind().owned();
        let properties = node
            .as_path()
            .and_then(|p| p.reserved(ReservedKind::Properties));

        // properties see the inherited scope, everything else the merged one
        let merged = match properties {
            Some(slot) => self.properties(tree, slot, scope, changed)?,
            None => scope.clone(),
        };
        for child in children.into_iter().filter(|c| Some(*c) != properties) {
            self.visit(tree, child, &merged, changed)?;
        }
        Ok(())
    }

    /// Interpolates a properties slot against the inherited scope and
    /// returns the scope extended with its entries.
    fn properties(
        &self,
        tree: &mut ConfigTree,
        slot: NodeId,
        inherited: &Scope,
        changed: &mut usize,
    ) -> DomainResult<Scope> {
        let entries = tree.node(slot)?.kind().owned();
        let mut merged = inherited.clone();
        for entry in entries {
            self.value(tree, entry, inherited, changed)?;
            let node = tree.node(entry)?;
            if let (Some(name), Some(value)) = (node.name(), node.as_value()) {
                if !value.is_encrypted() {
                    merged.insert(name.to_string(), value.value().to_string());
                }
            }
        }
        Ok(merged)
    }

    fn value(
        &self,
        tree: &mut ConfigTree,
        id: NodeId,
        scope: &Scope,
        changed: &mut usize,
    ) -> DomainResult<()> {
        let Some(value) = tree.node(id)?.as_value() else {
            return Ok(());
        };
        if value.is_encrypted() || !value.value().contains("${") {
            return Ok(());
        }
        let replaced = self.substitute(value.value(), scope);
        if replaced != value.value() {
            tree.set_value(id, replaced)?;
            *changed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_prefers_scope_over_env() {
        let scope = Scope::from([("HOME".to_string(), "/scoped".to_string())]);
        let text = VariableInterpolator::new(true).substitute("${HOME}/x", &scope);
        assert_eq!(text, "/scoped/x");
    }

    #[test]
    fn test_unknown_name_is_left_untouched() {
        let text = VariableInterpolator::new(false).substitute("a ${NOPE} b", &Scope::new());
        assert_eq!(text, "a ${NOPE} b");
    }

    #[test]
    fn test_single_pass() {
        let scope = Scope::from([
            ("a".to_string(), "${b}".to_string()),
            ("b".to_string(), "x".to_string()),
        ]);
        let text = VariableInterpolator::new(false).substitute("${a}", &scope);
        assert_eq!(text, "${b}");
    }
}
