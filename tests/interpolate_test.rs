//! Tests for `${name}` interpolation during load

use std::sync::Arc;

use tempfile::TempDir;

use nodeconf::application::services::ConfigurationLoader;
use nodeconf::infrastructure::traits::RealFileSystem;
use nodeconf::util::testing::{document, write_document};

const ENV_VAR: &str = "INTERPOLATE_TEST_APP_HOME";

fn load(body: &str, use_env: bool) -> nodeconf::domain::Configuration {
    let temp = TempDir::new().unwrap();
    let path = write_document(temp.path(), "app.toml", &document("app", "1.0", body));
    ConfigurationLoader::new(Arc::new(RealFileSystem))
        .with_interpolate_env(use_env)
        .load(&path)
        .unwrap()
}

#[test]
fn given_environment_variable_when_load_then_marker_is_replaced() {
    // Arrange
    std::env::set_var(ENV_VAR, "/home/tester");
    let body = format!("config = \"${{{ENV_VAR}}}/app.cfg\"");

    // Act
    let config = load(&body, true);

    // Assert
    assert_eq!(
        config.value("app/config").unwrap().unwrap().value(),
        "/home/tester/app.cfg"
    );
}

#[test]
fn given_environment_lookup_disabled_when_load_then_marker_is_kept() {
    // Arrange
    std::env::set_var(ENV_VAR, "/home/tester");
    let body = format!("config = \"${{{ENV_VAR}}}/app.cfg\"");

    // Act
    let config = load(&body, false);

    // Assert
    assert_eq!(
        config.value("app/config").unwrap().unwrap().value(),
        format!("${{{ENV_VAR}}}/app.cfg")
    );
}

#[test]
fn given_unknown_name_when_load_then_marker_is_kept() {
    // Act
    let config = load("config = \"${INTERPOLATE_TEST_SURELY_UNSET}/x\"", true);

    // Assert
    assert_eq!(
        config.value("app/config").unwrap().unwrap().value(),
        "${INTERPOLATE_TEST_SURELY_UNSET}/x"
    );
}

#[test]
fn given_properties_when_load_then_descendants_resolve_against_them() {
    // Arrange
    let body = r#"
logs = "${root}/logs"

[app.__properties]
root = "/opt/app"

[app.server.__properties]
root = "/srv"

[app.server.worker]
data = "${root}/data"
"#;

    // Act
    let config = load(body, false);

    // Assert
    assert_eq!(
        config.value("app/logs").unwrap().unwrap().value(),
        "/opt/app/logs"
    );
    assert_eq!(
        config.value("app/server/worker/data").unwrap().unwrap().value(),
        "/srv/data"
    );
}

#[test]
fn given_property_referencing_outer_property_when_load_then_resolved_once() {
    // Arrange
    let body = r#"
[app.__properties]
base = "/opt"

[app.server.__properties]
home = "${base}/server"

[app.server]
conf = "${home}/conf"
"#;

    // Act
    let config = load(body, false);

    // Assert
    assert_eq!(
        config.value("app/server/$/home").unwrap().unwrap().value(),
        "/opt/server"
    );
    assert_eq!(
        config.value("app/server/conf").unwrap().unwrap().value(),
        "/opt/server/conf"
    );
}

#[test]
fn given_included_document_when_load_then_markers_are_replaced_in_a_single_pass() {
    // Arrange
    let temp = TempDir::new().unwrap();
    write_document(
        temp.path(),
        "db.toml",
        &document(
            "db",
            "1.0",
            "v = \"${p}\"\n\n[db.__properties]\nq = \"Q\"\np = \"${q}\"",
        ),
    );
    let path = write_document(
        temp.path(),
        "app.toml",
        &document(
            "app",
            "1.0",
            "[app.database]\n__include = { name = \"db\", path = \"db.toml\", version = \"1.x\" }",
        ),
    );

    // Act
    let config = ConfigurationLoader::new(Arc::new(RealFileSystem))
        .with_interpolate_env(false)
        .load(&path)
        .unwrap();

    // Assert
    // p only sees the scope inherited from outside db, so it keeps its marker
    assert_eq!(
        config.value("app/database/$/p").unwrap().unwrap().value(),
        "${q}"
    );
    assert_eq!(
        config.value("app/database/v").unwrap().unwrap().value(),
        "${q}"
    );
}
