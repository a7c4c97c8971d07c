//! Service container for dependency injection
//!
//! Wires the loader with its file system, vaults and overlay store.

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::services::{ConfigurationLoader, SecretService, VaultRegistry};
use crate::config::Settings;
use crate::infrastructure::overlay_store::TomlOverlayStore;
use crate::infrastructure::traits::{
    CommandRunner, FileSystem, OverlayStore, RealCommandRunner, RealFileSystem,
};
use crate::infrastructure::vault::SopsVault;

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Command runner abstraction
    pub cmd: Arc<dyn CommandRunner>,

    /// Vaults available for passcode checks and decryption
    pub vaults: VaultRegistry,

    /// Overlay record store, if one is configured
    pub overlay: Option<Arc<dyn OverlayStore>>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(RealCommandRunner),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
    ) -> Self {
        let settings = Arc::new(settings);
        let vaults = VaultRegistry::new().with(Arc::new(SopsVault::new(
            settings.vault.clone(),
            Arc::clone(&cmd),
        )));
        let overlay = settings
            .loader
            .overlay_file
            .as_ref()
            .map(|path| -> Arc<dyn OverlayStore> {
                Arc::new(TomlOverlayStore::new(path, Arc::clone(&fs)))
            });

        Self {
            settings,
            fs,
            cmd,
            vaults,
            overlay,
        }
    }

    /// Replaces the overlay store with a records file.
    pub fn with_overlay_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay = Some(Arc::new(TomlOverlayStore::new(path, Arc::clone(&self.fs))));
        self
    }

    pub fn with_overlay_store(mut self, store: Arc<dyn OverlayStore>) -> Self {
        self.overlay = Some(store);
        self
    }

    /// Loader wired with this container's settings and collaborators.
    pub fn loader(&self) -> ConfigurationLoader {
        let loader = ConfigurationLoader::from_settings(&self.settings, Arc::clone(&self.fs))
            .with_vaults(self.vaults.clone());
        match &self.overlay {
            Some(store) => loader.with_overlay_store(Arc::clone(store)),
            None => loader,
        }
    }

    pub fn secrets(&self) -> SecretService {
        SecretService::new(self.vaults.clone())
    }
}
