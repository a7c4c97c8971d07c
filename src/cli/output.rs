//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use colored::Colorize;
use termtree::Tree;

use crate::domain::{Children, ConfigTree, NodeId, NodeKind, State};

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print completed action (green label)
pub fn action(label: &str, msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print indented detail (no color)
pub fn detail(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {}", msg);
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}

fn state_label(state: State) -> String {
    let text = state.to_string();
    match state {
        State::Synced => text.green().to_string(),
        State::Updated => text.yellow().to_string(),
        State::Loading => text.cyan().to_string(),
        State::Deleted => text.dimmed().to_string(),
        State::Error => text.red().bold().to_string(),
    }
}

fn node_label(tree: &ConfigTree, id: NodeId) -> String {
    let Some(node) = tree.get(id) else {
        return "?".to_string();
    };
    let name = tree.effective_name(id).unwrap_or("-");
    let detail = match node.kind() {
        NodeKind::Value(v) if v.is_encrypted() => format!(" = {}", "<encrypted>".dimmed()),
        NodeKind::Value(v) => format!(" = {} ({})", v.value(), v.value_type()),
        NodeKind::Include(inc) => format!(
            " -> {} v{}",
            inc.descriptor().config_name,
            inc.resolved_version()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
        NodeKind::Resource(res) => format!(
            " -> {}",
            res.handle()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| res.descriptor().location.clone())
        ),
        _ => String::new(),
    };
    format!(
        "{} [{}]{} {}",
        name.bold(),
        node.kind().name(),
        detail,
        state_label(node.state().state())
    )
}

/// Renders the subtree below `id` as an indented tree.
pub fn node_tree(tree: &ConfigTree, id: NodeId) -> Tree<String> {
    let leaves = tree
        .get(id)
        .map(|n| n.kind().owned())
        .unwrap_or_default()
        .into_iter()
        .map(|child| node_tree(tree, child));
    Tree::new(node_label(tree, id)).with_leaves(leaves)
}
