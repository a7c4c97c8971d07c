//! Infrastructure layer: I/O implementations and DI container
//!
//! This layer implements I/O boundary traits and wires up services.

pub mod di;
pub mod error;
pub mod overlay_store;
pub mod traits;
pub mod vault;

pub use error::{InfraError, InfraResult};
pub use overlay_store::{MemoryOverlayStore, TomlOverlayStore};
pub use vault::SopsVault;
