//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/nodeconf/nodeconf.toml`
//! 3. Local config: `<dir>/.nodeconf.toml`
//! 4. Environment variables: `NODECONF_*` prefix

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{ExactPolicy, QuerySyntax, SameMajorPolicy, VersionPolicy};

/// Encryption vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault name configurations refer to in their header
    pub name: String,
    /// Executable used for value encryption
    pub command: String,
    /// GPG key fingerprint for encryption
    pub gpg_key: Option<String>,
    /// Age public key (alternative to GPG)
    pub age_key: Option<String>,
    /// Environment variable holding the vault passcode
    pub passcode_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            command: "sops".into(),
            gpg_key: None,
            age_key: None,
            passcode_env: "NODECONF_VAULT_PASSCODE".into(),
        }
    }
}

/// Include version compatibility rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicyKind {
    #[default]
    SameMajor,
    Exact,
}

impl VersionPolicyKind {
    pub fn policy(&self) -> Arc<dyn VersionPolicy> {
        match self {
            VersionPolicyKind::SameMajor => Arc::new(SameMajorPolicy),
            VersionPolicyKind::Exact => Arc::new(ExactPolicy),
        }
    }
}

/// Load pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Overlay records file applied to database-sourced nodes
    pub overlay_file: Option<PathBuf>,
    /// Include version compatibility rule
    pub version_policy: VersionPolicyKind,
    /// Fall back to process environment when interpolating `${name}`
    pub interpolate_env: bool,
    /// Extra directories searched for includes not found next to their parent
    pub include_dirs: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            overlay_file: None,
            version_policy: VersionPolicyKind::SameMajor,
            interpolate_env: true,
            include_dirs: vec![],
        }
    }
}

/// Raw vault config for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawVaultConfig {
    pub name: Option<String>,
    pub command: Option<String>,
    pub gpg_key: Option<String>,
    pub age_key: Option<String>,
    pub passcode_env: Option<String>,
}

/// Raw loader config (arrays are Option to detect "not specified").
///
/// - `None` → field not specified, inherit from base
/// - `Some([])` → explicit empty array
/// - `Some([...])` → explicit values to merge
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawLoaderConfig {
    pub overlay_file: Option<PathBuf>,
    pub version_policy: Option<VersionPolicyKind>,
    pub interpolate_env: Option<bool>,
    pub include_dirs: Option<Vec<String>>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub syntax: Option<QuerySyntax>,
    pub vault: RawVaultConfig,
    pub loader: RawLoaderConfig,
}

impl VaultConfig {
    pub fn merge(&self, overlay: &RawVaultConfig) -> Self {
        Self {
            name: overlay.name.clone().unwrap_or_else(|| self.name.clone()),
            command: overlay
                .command
                .clone()
                .unwrap_or_else(|| self.command.clone()),
            gpg_key: overlay.gpg_key.clone().or_else(|| self.gpg_key.clone()),
            age_key: overlay.age_key.clone().or_else(|| self.age_key.clone()),
            passcode_env: overlay
                .passcode_env
                .clone()
                .unwrap_or_else(|| self.passcode_env.clone()),
        }
    }
}

impl LoaderConfig {
    /// Merge arrays with union semantics and negation support.
    ///
    /// - Items from overlay are appended to base, keeping first-seen order
    /// - Items prefixed with `!` remove the corresponding item from the result
    /// - Duplicates are de-duplicated
    ///
    /// Order matters: include directories are searched front to back.
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["b", "a"], &["c"])       // → ["b", "a", "c"]
    /// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let mut result: IndexSet<String> = base.iter().cloned().collect();

        for pattern in overlay {
            if let Some(negated) = pattern.strip_prefix('!') {
                result.shift_remove(negated);
            } else {
                result.insert(pattern.clone());
            }
        }

        result.into_iter().collect()
    }

    /// Merge overlay config onto self: scalars win if set, arrays union.
    pub fn merge(&self, overlay: &RawLoaderConfig) -> Self {
        Self {
            overlay_file: overlay
                .overlay_file
                .clone()
                .or_else(|| self.overlay_file.clone()),
            version_policy: overlay.version_policy.unwrap_or(self.version_policy),
            interpolate_env: overlay.interpolate_env.unwrap_or(self.interpolate_env),
            include_dirs: overlay
                .include_dirs
                .as_ref()
                .map(|o| Self::merge_array(&self.include_dirs, o))
                .unwrap_or_else(|| self.include_dirs.clone()),
        }
    }

    /// Apply global config onto defaults; arrays REPLACE instead of union.
    pub fn apply_global(&self, global: &RawLoaderConfig) -> Self {
        Self {
            overlay_file: global
                .overlay_file
                .clone()
                .or_else(|| self.overlay_file.clone()),
            version_policy: global.version_policy.unwrap_or(self.version_policy),
            interpolate_env: global.interpolate_env.unwrap_or(self.interpolate_env),
            include_dirs: global
                .include_dirs
                .clone()
                .unwrap_or_else(|| self.include_dirs.clone()),
        }
    }
}

/// Unified configuration for nodeconf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    /// Query language characters and reserved names
    pub syntax: QuerySyntax,
    /// Encryption vault settings
    pub vault: VaultConfig,
    /// Load pipeline settings
    pub loader: LoaderConfig,
}

/// Get the XDG config directory for nodeconf.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "nodeconf").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("nodeconf.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".nodeconf.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables are left as written.
fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        if let Some(file) = &self.loader.overlay_file {
            self.loader.overlay_file = Some(PathBuf::from(expand(&file.to_string_lossy())));
        }
        self.loader.include_dirs = self
            .loader
            .include_dirs
            .iter()
            .map(|d| expand(d))
            .collect();
    }

    /// Merge overlay config onto self (base) with union semantics for arrays.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            syntax: overlay
                .syntax
                .clone()
                .unwrap_or_else(|| self.syntax.clone()),
            vault: self.vault.merge(&overlay.vault),
            loader: self.loader.merge(&overlay.loader),
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for arrays.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            syntax: global
                .syntax
                .clone()
                .unwrap_or_else(|| self.syntax.clone()),
            vault: self.vault.merge(&global.vault),
            loader: self.loader.apply_global(&global.loader),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.nodeconf.toml`
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → Local: UNION with negation support
    /// - Any → Env vars: REPLACE
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path().filter(|p| p.exists());
        Self::load_from(global.as_deref(), local_dir)
    }

    /// Same as [`load`](Self::load) with an explicit global config file.
    pub fn load_from(
        global_path: Option<&Path>,
        local_dir: Option<&Path>,
    ) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_path {
            let raw = load_raw_settings(global_path)?;
            current = current.apply_global(&raw);
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply NODECONF_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("NODECONF")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("loader.include_dirs")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("vault.name") {
            settings.vault.name = val;
        }
        if let Ok(val) = config.get_string("vault.command") {
            settings.vault.command = val;
        }
        if let Ok(val) = config.get_string("vault.gpg_key") {
            settings.vault.gpg_key = Some(val);
        }
        if let Ok(val) = config.get_string("vault.age_key") {
            settings.vault.age_key = Some(val);
        }
        if let Ok(val) = config.get_string("vault.passcode_env") {
            settings.vault.passcode_env = val;
        }
        if let Ok(val) = config.get_string("loader.overlay_file") {
            settings.loader.overlay_file = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("loader.version_policy") {
            settings.loader.version_policy = match val.as_str() {
                "exact" => VersionPolicyKind::Exact,
                "same-major" | "same_major" => VersionPolicyKind::SameMajor,
                other => {
                    return Err(ApplicationError::Config {
                        message: format!("unknown version policy: {other}"),
                    })
                }
            };
        }
        if let Ok(val) = config.get_bool("loader.interpolate_env") {
            settings.loader.interpolate_env = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("loader.include_dirs") {
            settings.loader.include_dirs = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# nodeconf configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/nodeconf/nodeconf.toml
#   Local:  <dir>/.nodeconf.toml
#   Env:    NODECONF_* environment variables, e.g. NODECONF_VAULT__NAME
#
# Local include_dirs UNION with global; "!dir" removes an inherited entry.

[syntax]
# separator = "/"
# search_separator = ":"
# wildcard = "*"
# recursive_wildcard = "**"
# parameters_name = "__parameters"

[vault]
# name = "default"
# command = "sops"
# age_key = "age1..."
# passcode_env = "NODECONF_VAULT_PASSCODE"

[loader]
# overlay_file = "~/.config/nodeconf/overlay.toml"
# version_policy = "same-major"   # or "exact"
# interpolate_env = true
# include_dirs = ["~/shared/config"]
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
