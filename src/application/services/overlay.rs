//! Overlay merge: values from the record store replace `DataBase` nodes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    ConfigNode, ConfigTree, Configuration, DomainError, NodeId, NodeKind, NodeSource,
    OverlayRecord, State, ValueNode,
};
use crate::infrastructure::traits::OverlayStore;

pub struct OverlayMerger {
    store: Arc<dyn OverlayStore>,
}

impl OverlayMerger {
    pub fn new(store: Arc<dyn OverlayStore>) -> Self {
        Self { store }
    }

    /// Applies the store's records to a configuration that is still loading.
    ///
    /// Returns the number of records applied.
    #[instrument(level = "debug", skip(self, config), fields(config = %config.id()))]
    pub fn merge(&self, config: &mut Configuration) -> ApplicationResult<usize> {
        if config.state().state() != State::Loading {
            return Err(DomainError::InvalidState {
                state: config.state().state().to_string(),
                operation: "overlay merge".to_string(),
            }
            .into());
        }
        let Some(root) = config.root() else {
            return Ok(0);
        };

        let major = config.version().major;
        let records = self
            .store
            .lookup(config.id(), major)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("overlay lookup for {} v{}", config.id(), major),
                source: Box::new(e),
            })?;
        if records.is_empty() {
            debug!("merge: no records");
            return Ok(0);
        }
        let index: HashMap<(String, String), OverlayRecord> = records
            .into_iter()
            .map(|r| ((r.path.clone(), r.name.clone()), r))
            .collect();

        let tree = config.tree_mut();
        let targets: Vec<NodeId> = tree
            .subtree(root)
            .into_iter()
            .filter(|id| {
                tree.get(*id)
                    .is_some_and(|n| n.source() == NodeSource::DataBase)
            })
            .collect();

        let mut applied = 0;
        for id in targets {
            let (kind, is_value, is_list) = {
                let node = tree.node(id)?;
                (
                    node.kind().name(),
                    node.as_value().is_some(),
                    node.as_list_values().is_some(),
                )
            };
            if is_value {
                let Some(parent) = tree.node(id)?.parent() else {
                    continue;
                };
                let key = (
                    tree.absolute_path(parent)?,
                    tree.node(id)?.name().unwrap_or_default().to_string(),
                );
                if let Some(record) = index.get(&key) {
                    overwrite(tree.node_mut(id)?, record);
                    applied += 1;
                }
            } else if is_list {
                applied += merge_list(tree, id, &index)?;
            } else {
                debug!("merge: {} nodes take no overlay", kind);
            }
        }
        debug!("merge: applied {} record(s)", applied);
        Ok(applied)
    }
}

fn overwrite(node: &mut ConfigNode, record: &OverlayRecord) {
    if let NodeKind::Value(v) = &mut node.kind {
        v.value = record.value.clone();
        v.value_type = record.value_type;
        v.encrypted = record.encrypted;
    }
}

/// Positions `0, 1, ..` of a list, keyed by the list path; stops at the
/// first position without a record.
fn merge_list(
    tree: &mut ConfigTree,
    list: NodeId,
    index: &HashMap<(String, String), OverlayRecord>,
) -> ApplicationResult<usize> {
    let list_path = tree.absolute_path(list)?;
    let owner = tree.node(list)?.configuration().to_string();
    let mut applied = 0;

    for position in 0.. {
        let Some(record) = index.get(&(list_path.clone(), position.to_string())) else {
            break;
        };
        let existing = tree.node(list)?.as_list_values().and_then(|l| l.get(position));
        match existing {
            Some(element) => overwrite(tree.node_mut(element)?, record),
            None => {
                let value = ValueNode {
                    value: record.value.clone(),
                    encrypted: record.encrypted,
                    value_type: record.value_type,
                    required: false,
                };
                let mut node = ConfigNode::new(NodeKind::Value(value), owner.clone());
                node.source = NodeSource::DataBase;
                let element = tree.insert(node);
                tree.push_element(list, element)?;
            }
        }
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfigHeader, ValueType, Version};
    use std::io;

    struct Records(Vec<OverlayRecord>);

    impl OverlayStore for Records {
        fn lookup(&self, config_id: &str, major: u64) -> io::Result<Vec<OverlayRecord>> {
            assert_eq!(config_id, "orders");
            assert_eq!(major, 1);
            Ok(self.0.clone())
        }
    }

    fn configuration(source: NodeSource) -> (Configuration, NodeId) {
        let mut tree = ConfigTree::default();
        let root = tree.insert(ConfigNode::new(NodeKind::path(), "orders"));
        tree.set_name(root, "orders").unwrap();
        tree.set_root(root).unwrap();
        let mut timeout = ConfigNode::new(NodeKind::value("30"), "orders");
        timeout.source = source;
        let timeout = tree.insert(timeout);
        tree.set_name(timeout, "timeout").unwrap();
        tree.add_child(root, timeout).unwrap();
        (
            Configuration::new(ConfigHeader::new("orders", Version::new(1, 2, 0)), tree),
            timeout,
        )
    }

    fn merger(records: Vec<OverlayRecord>) -> OverlayMerger {
        OverlayMerger::new(Arc::new(Records(records)))
    }

    #[test]
    fn test_database_value_is_overwritten() {
        let (mut config, timeout) = configuration(NodeSource::DataBase);
        let record = OverlayRecord::new("/orders", "timeout", "60").with_type(ValueType::Int);
        assert_eq!(merger(vec![record]).merge(&mut config).unwrap(), 1);
        let value = config.tree().node(timeout).unwrap().as_value().unwrap();
        assert_eq!(value.value(), "60");
        assert_eq!(value.value_type(), ValueType::Int);
    }

    #[test]
    fn test_local_value_is_untouched() {
        let (mut config, timeout) = configuration(NodeSource::Local);
        let record = OverlayRecord::new("/orders", "timeout", "60");
        assert_eq!(merger(vec![record]).merge(&mut config).unwrap(), 0);
        let value = config.tree().node(timeout).unwrap().as_value().unwrap();
        assert_eq!(value.value(), "30");
    }

    #[test]
    fn test_merge_after_load_is_refused() {
        let (mut config, _) = configuration(NodeSource::DataBase);
        config.loaded().unwrap();
        let err = merger(Vec::new()).merge(&mut config).unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::InvalidState { .. })
        ));
    }
}
