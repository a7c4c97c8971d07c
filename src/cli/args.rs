//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Hierarchical configuration trees: load, query and inspect node documents
#[derive(Parser, Debug)]
#[command(name = "nodeconf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Raise log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short = 'd', long = "debug", global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Directory holding the local settings file (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a configuration and print its node tree with states
    Load {
        /// Configuration document
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Overlay records file
        #[arg(long, value_hint = ValueHint::FilePath)]
        overlay: Option<PathBuf>,
    },

    /// Print the value(s) matched by a query
    Get {
        /// Configuration document
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Path query, e.g. `/orders/db/host` or `orders/**/port`
        query: String,

        /// Overlay records file
        #[arg(long, value_hint = ValueHint::FilePath)]
        overlay: Option<PathBuf>,

        /// Decrypt encrypted values through the configured vault
        #[arg(long)]
        decrypt: bool,
    },

    /// List absolute and search paths of all nodes
    Paths {
        /// Configuration document
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged settings
    Show,

    /// Print a settings template
    Template,

    /// Show settings file paths
    Path,
}
