//! Tests for overlay merging during load

use std::sync::Arc;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use nodeconf::application::services::ConfigurationLoader;
use nodeconf::config::Settings;
use nodeconf::domain::{NodeSource, OverlayRecord, State, ValueType};
use nodeconf::infrastructure::di::ServiceContainer;
use nodeconf::infrastructure::traits::RealFileSystem;
use nodeconf::infrastructure::{MemoryOverlayStore, TomlOverlayStore};
use nodeconf::util::testing::{document, write_document};

const BODY: &str = r#"
local = "kept"

[app.timeout]
__value = 30
__source = "database"

[app.ports]
__list = [8080, 8081, 8082]
__source = "database"
"#;

struct Fixture {
    temp: TempDir,
    path: std::path::PathBuf,
    store: Arc<MemoryOverlayStore>,
}

#[fixture]
fn app() -> Fixture {
    let temp = TempDir::new().unwrap();
    let path = write_document(temp.path(), "app.toml", &document("app", "1.4", BODY));
    Fixture {
        temp,
        path,
        store: Arc::new(MemoryOverlayStore::new()),
    }
}

fn loader(store: &Arc<MemoryOverlayStore>) -> ConfigurationLoader {
    ConfigurationLoader::new(Arc::new(RealFileSystem)).with_overlay_store(store.clone())
}

#[rstest]
fn given_record_for_database_value_when_load_then_value_is_replaced(app: Fixture) {
    // Arrange
    app.store.insert(
        "app",
        1,
        OverlayRecord::new("/app", "timeout", "60").with_type(ValueType::Int),
    );

    // Act
    let config = loader(&app.store).load(&app.path).unwrap();

    // Assert
    let timeout = config.value("app/timeout").unwrap().unwrap();
    assert_eq!(timeout.value(), "60");
    assert_eq!(timeout.value_type(), ValueType::Int);
}

#[rstest]
fn given_record_for_local_value_when_load_then_value_is_kept(app: Fixture) {
    // Arrange
    app.store
        .insert("app", 1, OverlayRecord::new("/app", "local", "replaced"));

    // Act
    let config = loader(&app.store).load(&app.path).unwrap();

    // Assert
    assert_eq!(config.value("app/local").unwrap().unwrap().value(), "kept");
}

#[rstest]
fn given_records_for_other_major_when_load_then_nothing_changes(app: Fixture) {
    // Arrange
    app.store
        .insert("app", 2, OverlayRecord::new("/app", "timeout", "60"));

    // Act
    let config = loader(&app.store).load(&app.path).unwrap();

    // Assert
    assert_eq!(config.value("app/timeout").unwrap().unwrap().value(), "30");
}

#[rstest]
fn given_more_records_than_list_elements_when_load_then_list_grows(app: Fixture) {
    // Arrange
    for position in 0..6 {
        app.store.insert(
            "app",
            1,
            OverlayRecord::new("/app/ports", position.to_string(), format!("90{:02}", position))
                .with_type(ValueType::Long),
        );
    }

    // Act
    let config = loader(&app.store).load(&app.path).unwrap();

    // Assert
    let ports: Vec<&str> = config
        .values("app/ports/*")
        .unwrap()
        .into_iter()
        .map(|v| v.value())
        .collect();
    assert_eq!(ports, vec!["9000", "9001", "9002", "9003", "9004", "9005"]);

    let tree = config.tree();
    let list = config.find("app/ports").unwrap().unwrap().node().unwrap();
    let list_node = tree.node(list).unwrap().as_list_values().unwrap();
    for position in 3..6 {
        let element = tree.node(list_node.get(position).unwrap()).unwrap();
        assert_eq!(element.source(), NodeSource::DataBase);
        assert_eq!(element.configuration(), "app");
        assert_eq!(element.state().state(), State::Synced);
    }
}

#[rstest]
fn given_gap_in_list_records_when_load_then_merge_stops_at_gap(app: Fixture) {
    // Arrange
    for position in [0, 1, 4] {
        app.store.insert(
            "app",
            1,
            OverlayRecord::new("/app/ports", position.to_string(), "1"),
        );
    }

    // Act
    let config = loader(&app.store).load(&app.path).unwrap();

    // Assert
    let ports: Vec<&str> = config
        .values("app/ports/*")
        .unwrap()
        .into_iter()
        .map(|v| v.value())
        .collect();
    assert_eq!(ports, vec!["1", "1", "8082"]);
}

#[rstest]
fn given_records_file_when_loading_through_container_then_records_apply(app: Fixture) {
    // Arrange
    let records_path = app.temp.path().join("records.toml");
    let store = TomlOverlayStore::new(&records_path, Arc::new(RealFileSystem));
    store
        .save("app", 1, &[OverlayRecord::new("/app", "timeout", "45")])
        .unwrap();
    let container = ServiceContainer::new(Settings::default()).with_overlay_file(&records_path);

    // Act
    let config = container.loader().load(&app.path).unwrap();

    // Assert
    assert_eq!(config.value("app/timeout").unwrap().unwrap().value(), "45");
}
