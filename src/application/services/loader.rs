//! Load pipeline: read, build, resolve includes and resources, verify the
//! vault passcode, merge overlays, interpolate, validate and mark synced.
//!
//! Included documents stop after the passcode check. Overlay and
//! interpolation run once, over the spliced outer tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, instrument, warn};

use crate::application::hash::passcode_matches;
use crate::application::reader::{FormatReader, TomlReader};
use crate::application::services::builder::{ConfigBuilder, IncludeResolver};
use crate::application::services::interpolate::VariableInterpolator;
use crate::application::services::overlay::OverlayMerger;
use crate::application::services::secrets::VaultRegistry;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{
    validate_structure, Configuration, DomainError, IncludeDescriptor, QuerySyntax,
    SameMajorPolicy, SecurityFault, VersionPolicy,
};
use crate::infrastructure::traits::{FileSystem, OverlayStore};

/// Reader used for top-level documents.
pub const DEFAULT_READER: &str = "toml";

pub struct ConfigurationLoader {
    fs: Arc<dyn FileSystem>,
    readers: HashMap<String, Arc<dyn FormatReader>>,
    overlay: Option<Arc<dyn OverlayStore>>,
    vaults: VaultRegistry,
    policy: Arc<dyn VersionPolicy>,
    syntax: QuerySyntax,
    interpolate_env: bool,
    include_dirs: Vec<PathBuf>,
}

impl ConfigurationLoader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        let mut readers: HashMap<String, Arc<dyn FormatReader>> = HashMap::new();
        readers.insert(DEFAULT_READER.to_string(), Arc::new(TomlReader));
        Self {
            fs,
            readers,
            overlay: None,
            vaults: VaultRegistry::new(),
            policy: Arc::new(SameMajorPolicy),
            syntax: QuerySyntax::default(),
            interpolate_env: true,
            include_dirs: Vec::new(),
        }
    }

    /// Loader configured from the `syntax` and `loader` settings sections.
    pub fn from_settings(settings: &Settings, fs: Arc<dyn FileSystem>) -> Self {
        Self::new(fs)
            .with_syntax(settings.syntax.clone())
            .with_policy(settings.loader.version_policy.policy())
            .with_interpolate_env(settings.loader.interpolate_env)
            .with_include_dirs(settings.loader.include_dirs.iter().map(PathBuf::from).collect())
    }

    pub fn with_reader(mut self, reader: Arc<dyn FormatReader>) -> Self {
        self.readers.insert(reader.name().to_string(), reader);
        self
    }

    pub fn with_overlay_store(mut self, store: Arc<dyn OverlayStore>) -> Self {
        self.overlay = Some(store);
        self
    }

    pub fn with_vaults(mut self, vaults: VaultRegistry) -> Self {
        self.vaults = vaults;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn VersionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_syntax(mut self, syntax: QuerySyntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_interpolate_env(mut self, enabled: bool) -> Self {
        self.interpolate_env = enabled;
        self
    }

    pub fn with_include_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.include_dirs = dirs;
        self
    }

    pub fn vaults(&self) -> &VaultRegistry {
        &self.vaults
    }

    pub fn syntax(&self) -> &QuerySyntax {
        &self.syntax
    }

    /// Loads the document at `path` into a synced configuration.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, path: &Path) -> ApplicationResult<Configuration> {
        let mut chain = Vec::new();
        let mut config = self.load_chain(path, DEFAULT_READER, &mut chain)?;
        self.finalize(&mut config)
            .map_err(|e| ApplicationError::aborted(config.id(), e))?;
        debug!(
            "load: '{}' v{} with {} nodes",
            config.id(),
            config.version(),
            config.tree().len()
        );
        Ok(config)
    }

    /// Runs the post-build stages on a configuration that is still loading.
    ///
    /// Any failure leaves the configuration in `Error`.
    #[instrument(level = "debug", skip(self, config), fields(config = %config.id()))]
    pub fn finalize(&self, config: &mut Configuration) -> ApplicationResult<()> {
        let outcome = self.run_stages(config);
        if let Err(e) = &outcome {
            warn!("finalize: '{}' failed: {}", config.id(), e);
            config.set_error(e);
        }
        outcome
    }

    fn run_stages(&self, config: &mut Configuration) -> ApplicationResult<()> {
        self.verify_passcode(config)?;
        if let Some(store) = &self.overlay {
            OverlayMerger::new(Arc::clone(store)).merge(config)?;
        }
        VariableInterpolator::new(self.interpolate_env).interpolate(config)?;
        config.loaded()?;
        Ok(())
    }

    /// Checks the configured vault's passcode against the header key hash.
    fn verify_passcode(&self, config: &Configuration) -> ApplicationResult<()> {
        let Some(key_hash) = config.header().key_hash.as_deref() else {
            return Ok(());
        };
        let vault = self.vaults.get(config.header().vault.as_deref())?;
        let passcode = vault.passcode()?;
        if !passcode_matches(key_hash, &passcode) {
            return Err(SecurityFault::PasscodeMismatch {
                vault: vault.name().to_string(),
            }
            .into());
        }
        debug!("verify_passcode: vault '{}' accepted", vault.name());
        Ok(())
    }

    fn load_chain(
        &self,
        path: &Path,
        reader: &str,
        chain: &mut Vec<PathBuf>,
    ) -> ApplicationResult<Configuration> {
        let origin = self
            .fs
            .canonicalize(path)
            .with_path_context("resolve configuration", path)?;
        if chain.contains(&origin) {
            let cycle = chain
                .iter()
                .chain(std::iter::once(&origin))
                .map(|p| p.display())
                .join(" -> ");
            return Err(DomainError::IncludeCycle(cycle).into());
        }
        let reader = self
            .readers
            .get(reader)
            .cloned()
            .ok_or_else(|| ApplicationError::UnknownReader(reader.to_string()))?;
        let content = self
            .fs
            .read_to_string(&origin)
            .with_path_context("read configuration", &origin)?;

        chain.push(origin.clone());
        let result = self.build(reader.as_ref(), &content, &origin, chain);
        chain.pop();
        result
    }

    fn build(
        &self,
        reader: &dyn FormatReader,
        content: &str,
        origin: &Path,
        chain: &mut Vec<PathBuf>,
    ) -> ApplicationResult<Configuration> {
        let mut builder =
            ConfigBuilder::new(self.syntax.clone()).with_policy(Arc::clone(&self.policy));
        let assembled = self.assemble(reader, &mut builder, content, origin, chain);
        let id = builder
            .header()
            .map(|h| h.id.clone())
            .unwrap_or_else(|| origin.display().to_string());
        if let Err(e) = assembled {
            warn!("build: '{}' failed: {}", id, e);
            return Err(ApplicationError::aborted(id, e));
        }

        let mut config = builder
            .finish()
            .and_then(|config| {
                let root = config
                    .root()
                    .ok_or_else(|| DomainError::MissingRequired("root node".to_string()))?;
                validate_structure(config.tree(), root)?;
                Ok(config)
            })
            .map_err(|e| ApplicationError::aborted(id, e.into()))?;
        config.set_source(origin);
        Ok(config)
    }

    fn assemble(
        &self,
        reader: &dyn FormatReader,
        builder: &mut ConfigBuilder,
        content: &str,
        origin: &Path,
        chain: &mut Vec<PathBuf>,
    ) -> ApplicationResult<()> {
        reader.read(content, origin, builder)?;
        let base_dir = origin.parent().unwrap_or_else(|| Path::new("."));

        let mut resolver = NestedLoad {
            loader: self,
            base_dir,
            chain,
        };
        for id in builder.pending_includes() {
            builder.resolve_include(id, &mut resolver)?;
        }
        for id in builder.pending_resources() {
            builder.resolve_resource(id, base_dir, self.fs.as_ref())?;
        }
        Ok(())
    }

    /// First existing candidate for an include path: next to the including
    /// document, then in each include directory.
    fn locate(&self, base_dir: &Path, descriptor: &IncludeDescriptor) -> ApplicationResult<PathBuf> {
        let expanded = shellexpand::full(&descriptor.path.to_string_lossy())
            .map(|s| PathBuf::from(s.into_owned()))
            .unwrap_or_else(|_| descriptor.path.clone());
        let candidates: Vec<PathBuf> = if expanded.is_absolute() {
            vec![expanded]
        } else {
            std::iter::once(base_dir.join(&expanded))
                .chain(self.include_dirs.iter().map(|dir| dir.join(&expanded)))
                .collect()
        };

        candidates
            .iter()
            .find(|c| self.fs.is_file(c))
            .cloned()
            .ok_or_else(|| {
                DomainError::UnresolvedInclude {
                    path: descriptor.path.display().to_string(),
                    reason: format!(
                        "'{}' not found (searched {})",
                        descriptor.config_name,
                        candidates.iter().map(|c| c.display()).join(", ")
                    ),
                }
                .into()
            })
    }
}

/// Resolves includes by reading and building the referenced file.
struct NestedLoad<'a> {
    loader: &'a ConfigurationLoader,
    base_dir: &'a Path,
    chain: &'a mut Vec<PathBuf>,
}

impl IncludeResolver for NestedLoad<'_> {
    fn resolve(&mut self, descriptor: &IncludeDescriptor) -> ApplicationResult<Configuration> {
        let path = self.loader.locate(self.base_dir, descriptor)?;
        debug!("resolve: include '{}' at {}", descriptor.config_name, path.display());
        let included = self.loader.load_chain(&path, &descriptor.reader, self.chain)?;
        self.loader
            .verify_passcode(&included)
            .map_err(|e| ApplicationError::aborted(included.id(), e))?;
        Ok(included)
    }
}
