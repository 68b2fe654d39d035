//! Command-line interface for au.

/// Clap argument definitions
mod args;

/// Comment command handlers
mod comment;

/// Development and debugging helpers
mod dev;

/// Todo command handlers
mod todo;

/// Shared CLI utilities
mod util;

/// Workspace command handlers
mod workspace;

use anyhow::{bail, Context, Result};
use au_core::config;
use au_core::store::{DirectoryStore, WorkspaceHandle};
use clap::Parser;

pub use args::{Cli, OutputFormat};
use args::Commands;

/// Everything a command handler needs: the opened store plus the resolved
/// workspace/author/format selections.
pub struct CliContext {
    pub store: DirectoryStore,
    pub workspace: Option<String>,
    pub author: Option<String>,
    pub format: OutputFormat,
}

impl CliContext {
    /// The selected workspace id, or an error telling the user how to pick
    /// one.
    pub fn require_workspace(&self) -> Result<&str> {
        self.workspace.as_deref().with_context(|| {
            format!(
                "no workspace selected - run 'au workspace use <id>', pass --workspace or set ${}",
                config::WORKSPACE_ENVIRONMENT_VARIABLE
            )
        })
    }

    /// The selected author identity, or an error telling the user how to
    /// configure one.
    pub fn require_author(&self) -> Result<String> {
        match &self.author {
            Some(author) => Ok(author.clone()),
            None => bail!(
                "no author configured - run 'au workspace set-author', pass --author or set ${}",
                config::AUTHOR_ENVIRONMENT_VARIABLE
            ),
        }
    }

    /// Open the selected workspace.
    pub fn open_current(&self, writeable: bool) -> Result<WorkspaceHandle> {
        let id = self.require_workspace()?;
        Ok(self.store.open_workspace(id, writeable)?)
    }
}

/// Parse arguments, resolve configuration and dispatch the command.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let root = config::resolve_storage_root(cli.directory.as_deref())?;
    let store = DirectoryStore::open(&root)?;
    let workspace = config::resolve_current_workspace(&root, cli.workspace.as_deref())?;
    let author = config::resolve_current_author(&root, cli.author.as_deref())?;

    let ctx = CliContext {
        store,
        workspace,
        author,
        format: cli.format,
    };

    match cli.command {
        Commands::Workspace { command } => workspace::handle(&ctx, command),
        Commands::Todo { command } => todo::handle(&ctx, command),
        Commands::Comment { command } => comment::handle(&ctx, command),
        Commands::Dev { command } => dev::handle(&ctx, command),
    }
}
