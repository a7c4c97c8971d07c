//! Integration tests for Settings loading with layered merge semantics.
//!
//! Merge Semantics:
//! - Defaults → Global: REPLACE (global defines the real baseline)
//! - Global → Local: UNION with negation support
//!
//! Global config files are passed explicitly, so no test touches the user's
//! real configuration.

use std::fs;
use std::path::PathBuf;

use rstest::rstest;
use tempfile::TempDir;

use nodeconf::config::{local_config_path, Settings, VersionPolicyKind};

fn write_global(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("nodeconf.toml");
    fs::write(&path, content).unwrap();
    path
}

fn write_local(dir: &TempDir, content: &str) {
    fs::write(local_config_path(dir.path()), content).unwrap();
}

#[test]
fn given_no_config_files_when_load_then_defaults() {
    // Arrange
    let local = TempDir::new().unwrap();

    // Act
    let settings = Settings::load_from(None, Some(local.path())).unwrap();

    // Assert
    assert_eq!(settings.loader.version_policy, VersionPolicyKind::SameMajor);
    assert!(settings.loader.include_dirs.is_empty());
    assert_eq!(settings.syntax.separator, '/');
}

#[test]
fn given_global_and_local_include_dirs_when_load_then_unions() {
    // Arrange
    let global_dir = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let global = write_global(&global_dir, "[loader]\ninclude_dirs = [\"/etc/shared\"]\n");
    write_local(&local, "[loader]\ninclude_dirs = [\"/srv/project\"]\n");

    // Act
    let settings = Settings::load_from(Some(&global), Some(local.path())).unwrap();

    // Assert
    assert_eq!(
        settings.loader.include_dirs,
        vec!["/etc/shared".to_string(), "/srv/project".to_string()]
    );
}

#[test]
fn given_unsorted_include_dirs_when_load_then_search_order_is_kept() {
    // Arrange
    let global_dir = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let global = write_global(
        &global_dir,
        "[loader]\ninclude_dirs = [\"/z/shared\", \"/b/team\"]\n",
    );
    write_local(
        &local,
        "[loader]\ninclude_dirs = [\"/y/first\", \"/a/second\", \"/z/shared\"]\n",
    );

    // Act
    let settings = Settings::load_from(Some(&global), Some(local.path())).unwrap();

    // Assert
    assert_eq!(
        settings.loader.include_dirs,
        vec!["/z/shared", "/b/team", "/y/first", "/a/second"]
    );
}

#[test]
fn given_negated_include_dir_in_local_when_load_then_removes_inherited_entry() {
    // Arrange
    let global_dir = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let global = write_global(
        &global_dir,
        "[loader]\ninclude_dirs = [\"/etc/shared\", \"/opt/legacy\"]\n",
    );
    write_local(&local, "[loader]\ninclude_dirs = [\"!/opt/legacy\"]\n");

    // Act
    let settings = Settings::load_from(Some(&global), Some(local.path())).unwrap();

    // Assert
    assert_eq!(settings.loader.include_dirs, vec!["/etc/shared".to_string()]);
}

#[test]
fn given_local_without_include_dirs_when_load_then_inherits_global() {
    // Arrange
    let global_dir = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let global = write_global(&global_dir, "[loader]\ninclude_dirs = [\"/etc/shared\"]\n");
    write_local(&local, "[loader]\ninterpolate_env = false\n");

    // Act
    let settings = Settings::load_from(Some(&global), Some(local.path())).unwrap();

    // Assert
    assert_eq!(settings.loader.include_dirs, vec!["/etc/shared".to_string()]);
    assert!(!settings.loader.interpolate_env);
}

#[rstest]
#[case("same-major", VersionPolicyKind::SameMajor)]
#[case("exact", VersionPolicyKind::Exact)]
fn given_version_policy_in_local_when_load_then_overrides_default(
    #[case] policy: &str,
    #[case] expected: VersionPolicyKind,
) {
    // Arrange
    let local = TempDir::new().unwrap();
    write_local(&local, &format!("[loader]\nversion_policy = \"{policy}\"\n"));

    // Act
    let settings = Settings::load_from(None, Some(local.path())).unwrap();

    // Assert
    assert_eq!(settings.loader.version_policy, expected);
}

#[test]
fn given_scalars_in_both_layers_when_load_then_local_wins() {
    // Arrange
    let global_dir = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let global = write_global(&global_dir, "[vault]\nname = \"team\"\ncommand = \"sops\"\n");
    write_local(&local, "[vault]\nname = \"project\"\n");

    // Act
    let settings = Settings::load_from(Some(&global), Some(local.path())).unwrap();

    // Assert
    assert_eq!(settings.vault.name, "project");
    assert_eq!(settings.vault.command, "sops");
}

#[test]
fn given_custom_syntax_when_load_then_replaces_default_syntax() {
    // Arrange
    let local = TempDir::new().unwrap();
    write_local(&local, "[syntax]\nseparator = \".\"\n");

    // Act
    let settings = Settings::load_from(None, Some(local.path())).unwrap();

    // Assert
    assert_eq!(settings.syntax.separator, '.');
    assert_eq!(settings.syntax.search_separator, ':');
}

#[test]
fn given_unparsable_local_config_when_load_then_config_error() {
    // Arrange
    let local = TempDir::new().unwrap();
    write_local(&local, "[loader\n");

    // Act
    let result = Settings::load_from(None, Some(local.path()));

    // Assert
    assert!(result.is_err());
}

#[test]
fn given_effective_settings_when_to_toml_then_round_trips() {
    // Arrange
    let settings = Settings::default();

    // Act
    let text = settings.to_toml().unwrap();

    // Assert
    let parsed: Settings = toml::from_str(&text).unwrap();
    assert_eq!(parsed, settings);
}
