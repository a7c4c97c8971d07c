//! Application services
//!
//! Concrete services that run the load pipeline over the domain tree.
//! They depend on I/O boundary traits (FileSystem, OverlayStore, Vault)
//! but are themselves concrete structs, not traits.

mod builder;
mod interpolate;
mod loader;
mod overlay;
mod secrets;

pub use builder::{ConfigBuilder, IncludeResolver};
pub use interpolate::VariableInterpolator;
pub use loader::{ConfigurationLoader, DEFAULT_READER};
pub use overlay::OverlayMerger;
pub use secrets::{SecretService, VaultRegistry, DEFAULT_VAULT};
