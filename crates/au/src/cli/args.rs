//! Clap argument definitions for the `au` binary.

use clap::{Parser, Subcommand, ValueEnum};

/// How structured command output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML documents (the default)
    Yaml,
    /// Pretty-printed JSON
    Json,
}

/// Local-first todo management on CRDT-backed workspaces.
#[derive(Debug, Parser)]
#[command(name = "au", version, about)]
pub struct Cli {
    /// Storage directory (defaults to $AU_DIRECTORY, then $HOME/.au)
    #[arg(long, global = true)]
    pub directory: Option<String>,

    /// Workspace id to operate on (defaults to $AU_WORKSPACE, then the
    /// current pointer)
    #[arg(long, global = true)]
    pub workspace: Option<String>,

    /// Author identity 'Name <email>' (defaults to $AU_AUTHOR, then the
    /// configured author)
    #[arg(long, global = true)]
    pub author: Option<String>,

    /// Output format for structured results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage workspaces
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
    /// Manage todos in the current workspace
    Todo {
        #[command(subcommand)]
        command: TodoCommands,
    },
    /// Manage comments on a todo
    Comment {
        #[command(subcommand)]
        command: CommentCommands,
    },
    /// Development and debugging helpers
    Dev {
        #[command(subcommand)]
        command: DevCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkspaceCommands {
    /// Create a new workspace and make it current
    Init {
        /// Human-readable label for the workspace
        alias: String,
    },
    /// List all workspaces in the storage directory
    List,
    /// Show one workspace's metadata
    Get {
        /// Workspace id; defaults to the current workspace
        id: Option<String>,
    },
    /// Point the `current` marker at a workspace
    Use {
        /// Workspace id to switch to
        id: String,
    },
    /// Delete a workspace file
    Delete {
        /// Workspace id; defaults to the current workspace
        id: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Serve workspaces over HTTP for peers to sync against
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },
    /// Sync the current workspace against a peer until caught up
    Sync {
        /// Base address of the peer, e.g. http://host:8080
        address: String,
    },
    /// Import a workspace from a peer that has it
    SyncImport {
        /// Workspace id to import
        id: String,
        /// Base address of the peer
        address: String,
    },
    /// Set the default author identity for this storage directory
    SetAuthor {
        /// Author identity in the form 'Name <email>'
        author: String,
    },
    /// Print the default author identity
    GetAuthor,
}

#[derive(Debug, Subcommand)]
pub enum TodoCommands {
    /// Create a todo
    Create {
        /// Title, 3-200 characters
        #[arg(long)]
        title: String,
        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
        /// Initial status, open or closed
        #[arg(long)]
        status: Option<String>,
        /// Annotation entries as KEY=VALUE; repeatable
        #[arg(long = "annotation", value_name = "KEY=VALUE")]
        annotations: Vec<String>,
        /// Compose the description in $AU_EDITOR / $EDITOR
        #[arg(long)]
        edit: bool,
    },
    /// List todos, ranked then oldest first
    List,
    /// Show one todo
    Get {
        /// Todo id
        id: String,
    },
    /// Edit fields of a todo
    Edit {
        /// Todo id
        id: String,
        /// Replacement title
        #[arg(long)]
        title: Option<String>,
        /// Replacement description
        #[arg(long)]
        description: Option<String>,
        /// Replacement status, open or closed
        #[arg(long)]
        status: Option<String>,
        /// Annotation upserts as KEY=VALUE (empty VALUE deletes); repeatable
        #[arg(long = "annotation", value_name = "KEY=VALUE")]
        annotations: Vec<String>,
        /// Revise the description in $AU_EDITOR / $EDITOR
        #[arg(long)]
        edit: bool,
    },
    /// Delete a todo
    Delete {
        /// Todo id
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum CommentCommands {
    /// Add a comment to a todo
    Create {
        /// Todo id to comment on
        todo_id: String,
        /// RFC 2045 media type of the content
        #[arg(long, default_value = "text/markdown")]
        media_type: String,
        /// Comment content; for non-text media types, a file path to read
        #[arg(long)]
        content: Option<String>,
        /// Compose markdown content in $AU_EDITOR / $EDITOR
        #[arg(long)]
        edit: bool,
    },
    /// List the comments on a todo, oldest first
    List {
        /// Todo id
        todo_id: String,
    },
    /// Show one comment
    Get {
        /// Todo id
        todo_id: String,
        /// Comment id
        comment_id: String,
    },
    /// Replace a comment's content
    Edit {
        /// Todo id
        todo_id: String,
        /// Comment id
        comment_id: String,
        /// Replacement content; for non-text media types, a file path
        #[arg(long)]
        content: Option<String>,
        /// Revise markdown content in $AU_EDITOR / $EDITOR
        #[arg(long)]
        edit: bool,
    },
    /// Delete a comment
    Delete {
        /// Todo id
        todo_id: String,
        /// Comment id
        comment_id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum DevCommands {
    /// Dump the whole current workspace, todos and comments included
    Dump,
    /// Print the document's commit history
    History,
    /// Print the commit graph in graphviz dot format
    HistoryDot,
    /// Fill the current workspace with generated todos
    FakeData {
        /// How many todos to generate
        #[arg(long, default_value_t = 10)]
        todos: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_todo_create_invocation() {
        let cli = Cli::parse_from([
            "au",
            "--format",
            "json",
            "todo",
            "create",
            "--title",
            "Do the thing",
            "--annotation",
            "about:blank#x=42",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Todo {
                command:
                    TodoCommands::Create {
                        title, annotations, ..
                    },
            } => {
                assert_eq!(title, "Do the thing");
                assert_eq!(annotations, vec!["about:blank#x=42".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
