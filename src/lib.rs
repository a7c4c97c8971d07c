//! nodeconf: hierarchical configuration trees
//!
//! Configurations are trees of named nodes (paths, values, lists, reserved
//! key/value slots, includes and resources) addressed by a path query
//! language. Loading runs a fixed pipeline:
//!
//! 1. a format reader builds the tree through [`application::services::ConfigBuilder`]
//! 2. includes are loaded recursively and spliced in, resources are resolved
//! 3. the vault passcode is checked against the header key hash
//! 4. overlay records replace `DataBase` values
//! 5. `${name}` markers are interpolated
//! 6. the tree is validated and marked synced
//!
//! Layers: `domain` (pure model), `application` (readers and services),
//! `infrastructure` (I/O implementations, wiring), `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
