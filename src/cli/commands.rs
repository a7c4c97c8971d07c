//! Command dispatch: each subcommand runs against a [`ServiceContainer`].

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::Configuration;
use crate::infrastructure::di::ServiceContainer;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| CliError::Usage(format!("cannot determine current directory: {}", e)))?,
    };

    match &cli.command {
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Some(Commands::Config { command }) => config_command(command, &project_dir),
        Some(command) => {
            let settings = Settings::load(Some(&project_dir))?;
            let container = ServiceContainer::new(settings);
            run(command, container)
        }
        None => Err(CliError::Usage("no command given, see --help".to_string())),
    }
}

fn run(command: &Commands, container: ServiceContainer) -> CliResult<()> {
    match command {
        Commands::Load { file, overlay } => cmd_load(&with_overlay(container, overlay), file),
        Commands::Get {
            file,
            query,
            overlay,
            decrypt,
        } => cmd_get(&with_overlay(container, overlay), file, query, *decrypt),
        Commands::Paths { file } => cmd_paths(&container, file),
        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}

fn with_overlay(container: ServiceContainer, overlay: &Option<PathBuf>) -> ServiceContainer {
    match overlay {
        Some(path) => container.with_overlay_file(path),
        None => container,
    }
}

fn load(container: &ServiceContainer, file: &Path) -> CliResult<Configuration> {
    Ok(container.loader().load(file)?)
}

#[instrument(level = "debug", skip(container))]
fn cmd_load(container: &ServiceContainer, file: &Path) -> CliResult<()> {
    let config = load(container, file)?;
    let header = config.header();
    output::header(&format!("{} ({}) v{}", header.name, header.id, header.version));
    if let Some(description) = &header.description {
        output::detail(description);
    }
    if let Some(root) = config.root() {
        output::info(&output::node_tree(config.tree(), root));
    }
    debug!("cmd_load: {} nodes", config.tree().len());
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_get(container: &ServiceContainer, file: &Path, query: &str, decrypt: bool) -> CliResult<()> {
    let config = load(container, file)?;
    let Some(found) = config.find(query)? else {
        output::warning(&format!("no node matches '{}'", query));
        return Ok(());
    };

    let secrets = container.secrets();
    for id in found.nodes() {
        let path = config.absolute_path(id)?;
        let Some(value) = config.tree().node(id)?.as_value() else {
            output::action(&path, &"<not a value>");
            continue;
        };
        if value.is_encrypted() && !decrypt {
            output::action(&path, &"<encrypted>");
            continue;
        }
        let text = if decrypt {
            secrets.reveal(&config, id)?
        } else {
            value.value().to_string()
        };
        if found.len() == 1 {
            output::info(&text);
        } else {
            output::action(&path, &text);
        }
    }
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_paths(container: &ServiceContainer, file: &Path) -> CliResult<()> {
    let config = load(container, file)?;
    let tree = config.tree();
    for (id, _) in tree.iter() {
        output::info(&format!(
            "{}\t{}",
            tree.absolute_path(id)?,
            tree.search_path(id)?
        ));
    }
    Ok(())
}

fn config_command(command: &ConfigCommands, project_dir: &Path) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(Some(project_dir))?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::action("global", &path.display()),
                None => output::warning("no global config directory on this platform"),
            }
            output::action("local", &local_config_path(project_dir).display());
        }
    }
    Ok(())
}
