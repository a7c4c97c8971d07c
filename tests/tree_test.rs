//! Tests for the node tree: naming, paths, queries and the state cascade.

use rstest::{fixture, rstest};

use nodeconf::domain::{
    ConfigNode, ConfigTree, DomainError, Found, NodeId, NodeKind, ReservedKind, State, ValueNode,
};

struct Sample {
    tree: ConfigTree,
    root: NodeId,
    server: NodeId,
    host: NodeId,
    port: NodeId,
    user: NodeId,
}

fn named(tree: &mut ConfigTree, kind: NodeKind, name: &str) -> NodeId {
    let id = tree.insert(ConfigNode::new(kind, "app"));
    tree.set_name(id, name).unwrap();
    id
}

/// `/app/server/{host,port}` plus `/app/server/__parameters/user`
#[fixture]
fn sample() -> Sample {
    let mut tree = ConfigTree::default();
    let root = named(&mut tree, NodeKind::path(), "app");
    tree.set_root(root).unwrap();
    let server = named(&mut tree, NodeKind::path(), "server");
    tree.add_child(root, server).unwrap();
    let host = named(&mut tree, NodeKind::value("localhost"), "host");
    tree.add_child(server, host).unwrap();
    let port = named(&mut tree, NodeKind::Value(ValueNode::new("8080")), "port");
    tree.add_child(server, port).unwrap();
    let params = tree.reserved_slot(server, ReservedKind::Parameters).unwrap();
    let user = named(&mut tree, NodeKind::value("svc"), "user");
    tree.put_entry(params, user).unwrap();
    Sample {
        tree,
        root,
        server,
        host,
        port,
        user,
    }
}

#[rstest]
#[case("server")]
#[case("db-01")]
#[case("with space")]
fn given_valid_name_when_set_name_then_succeeds(#[case] name: &str) {
    // Arrange
    let mut tree = ConfigTree::default();
    let id = tree.insert(ConfigNode::new(NodeKind::path(), "app"));

    // Act
    let result = tree.set_name(id, name);

    // Assert
    assert!(result.is_ok());
    assert_eq!(tree.node(id).unwrap().name(), Some(name));
}

#[rstest]
#[case("a/b")]
#[case("a:b")]
fn given_separator_in_name_when_set_name_on_path_node_then_fails(#[case] name: &str) {
    // Arrange
    let mut tree = ConfigTree::default();
    let id = tree.insert(ConfigNode::new(NodeKind::path(), "app"));

    // Act
    let result = tree.set_name(id, name);

    // Assert
    assert!(matches!(result, Err(DomainError::InvalidName { .. })));
}

#[test]
fn given_separator_in_name_when_set_name_on_value_node_then_succeeds() {
    // Arrange
    let mut tree = ConfigTree::default();
    let id = tree.insert(ConfigNode::new(NodeKind::value("x"), "app"));

    // Act
    let result = tree.set_name(id, "http://host");

    // Assert
    assert!(result.is_ok());
}

#[rstest]
fn given_any_node_when_absolute_path_then_extends_parent_path(sample: Sample) {
    // Arrange
    let tree = &sample.tree;

    for (id, node) in tree.iter() {
        // Act
        let path = tree.absolute_path(id).unwrap();

        // Assert
        match node.parent() {
            Some(parent) => assert_eq!(
                path,
                format!("{}/{}", tree.absolute_path(parent).unwrap(), node.name().unwrap())
            ),
            None => assert_eq!(path, "/app"),
        }
    }
}

#[rstest]
fn given_any_node_when_finding_its_absolute_path_then_returns_that_node(sample: Sample) {
    // Arrange
    let tree = &sample.tree;

    for (id, _) in tree.iter() {
        let path = tree.absolute_path(id).unwrap();

        // Act
        let found = tree.find(sample.port, &path).unwrap();

        // Assert
        assert_eq!(found, Some(Found::Node(id)), "path {}", path);
    }
}

#[rstest]
fn given_two_children_when_query_ends_in_wildcard_then_returns_both(sample: Sample) {
    // Act
    let found = sample.tree.find(sample.root, "app/server/*").unwrap();

    // Assert
    let Some(Found::Many(result)) = found else {
        panic!("expected a search result, got {:?}", found);
    };
    assert_eq!(result.nodes(), &[sample.host, sample.port]);
}

#[rstest]
fn given_members_in_different_subtrees_when_search_result_is_queried_then_matches_are_aggregated(
    mut sample: Sample,
) {
    // Arrange
    let client = named(&mut sample.tree, NodeKind::path(), "client");
    sample.tree.add_child(sample.root, client).unwrap();
    let client_host = named(&mut sample.tree, NodeKind::value("remote"), "host");
    sample.tree.add_child(client, client_host).unwrap();
    let Some(Found::Many(hosts)) = sample.tree.find(sample.root, "app/*/host").unwrap() else {
        panic!("expected one host per subtree");
    };
    assert_eq!(hosts.nodes(), &[sample.host, client_host]);

    // Act
    let parents = hosts.find(&sample.tree, "..").unwrap();
    let converged = hosts.find(&sample.tree, "../../server/port").unwrap();
    let missing = hosts.find(&sample.tree, "../nothing").unwrap();

    // Assert
    let Some(Found::Many(parents)) = parents else {
        panic!("expected both parents, got {:?}", parents);
    };
    assert_eq!(parents.nodes(), &[sample.server, client]);
    assert_eq!(converged, Some(Found::Node(sample.port)));
    assert_eq!(missing, None);
}

#[rstest]
fn given_single_child_when_query_ends_in_wildcard_then_returns_child_unwrapped(sample: Sample) {
    // Act
    let found = sample.tree.find(sample.root, "app/*").unwrap();

    // Assert
    assert_eq!(found, Some(Found::Node(sample.server)));
}

#[rstest]
#[case("app/server#user")]
#[case("app/server/#/user")]
#[case("app/server/__parameters/user")]
#[case(":server#user")]
#[case("/app/server/port/../#/user")]
fn given_reserved_slot_when_addressed_any_way_then_finds_entry(
    sample: Sample,
    #[case] query: &str,
) {
    // Act
    let found = sample.tree.find(sample.root, query).unwrap();

    // Assert
    assert_eq!(found, Some(Found::Node(sample.user)));
}

#[rstest]
#[case("")]
#[case("app//server")]
#[case("app/server[x]")]
fn given_malformed_query_when_find_then_errors(sample: Sample, #[case] query: &str) {
    // Act
    let result = sample.tree.find(sample.root, query);

    // Assert
    assert!(matches!(result, Err(DomainError::MalformedQuery { .. })));
}

#[rstest]
fn given_missing_node_when_find_then_returns_none(sample: Sample) {
    // Act
    let found = sample.tree.find(sample.root, "app/server/timeout").unwrap();

    // Assert
    assert_eq!(found, None);
}

#[rstest]
fn given_clean_subtree_when_loaded_then_all_descendants_synced(mut sample: Sample) {
    // Act
    sample.tree.loaded(sample.root).unwrap();

    // Assert
    for (_, node) in sample.tree.iter() {
        assert_eq!(node.state().state(), State::Synced);
    }
}

#[rstest]
fn given_descendant_in_error_when_loaded_then_fails_and_changes_nothing(mut sample: Sample) {
    // Arrange
    sample.tree.set_error(sample.user, "bad value").unwrap();

    // Act
    let result = sample.tree.loaded(sample.root);

    // Assert
    assert!(matches!(result, Err(DomainError::InvalidState { .. })));
    for (id, node) in sample.tree.iter() {
        let expected = if id == sample.user {
            State::Error
        } else {
            State::Loading
        };
        assert_eq!(node.state().state(), expected);
    }
}

#[rstest]
fn given_loading_node_when_deleted_then_fails_and_state_unchanged(mut sample: Sample) {
    // Act
    let deleted = sample.tree.deleted(sample.port).unwrap();

    // Assert
    assert!(!deleted);
    assert_eq!(
        sample.tree.node(sample.port).unwrap().state().state(),
        State::Loading
    );
}

#[rstest]
fn given_synced_node_when_deleted_then_succeeds(mut sample: Sample) {
    // Arrange
    sample.tree.loaded(sample.root).unwrap();

    // Act
    let deleted = sample.tree.deleted(sample.port).unwrap();

    // Assert
    assert!(deleted);
    assert_eq!(
        sample.tree.node(sample.port).unwrap().state().state(),
        State::Deleted
    );
}

#[rstest]
fn given_synced_tree_when_remove_child_then_subtree_freed_and_parent_updated(mut sample: Sample) {
    // Arrange
    sample.tree.loaded(sample.root).unwrap();

    // Act
    let removed = sample.tree.remove_child(sample.root, "server").unwrap();

    // Assert
    assert!(removed);
    for id in [sample.server, sample.host, sample.port, sample.user] {
        assert!(!sample.tree.contains(id));
    }
    assert!(matches!(
        sample.tree.node(sample.host),
        Err(DomainError::StaleHandle)
    ));
    assert_eq!(
        sample.tree.node(sample.root).unwrap().state().state(),
        State::Updated
    );
    assert_eq!(sample.tree.find(sample.root, "app/server/host").unwrap(), None);
}

#[rstest]
fn given_unknown_name_when_remove_child_then_returns_false(mut sample: Sample) {
    // Act
    let removed = sample.tree.remove_child(sample.server, "timeout").unwrap();

    // Assert
    assert!(!removed);
    assert_eq!(sample.tree.len(), 6);
}

#[rstest]
fn given_entry_in_reserved_slot_when_search_path_then_uses_marker(sample: Sample) {
    // Act
    let absolute = sample.tree.absolute_path(sample.user).unwrap();
    let search = sample.tree.search_path(sample.user).unwrap();

    // Assert
    assert_eq!(absolute, "/app/server/__parameters/user");
    assert_eq!(search, "/app/server/#/user");
}
