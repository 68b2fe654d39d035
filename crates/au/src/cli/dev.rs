//! Development helpers: dump, history and fake data generation.

use std::collections::BTreeMap;

use anyhow::Result;
use au_core::model::{Comment, CreateCommentParams, CreateTodoParams, Todo};
use au_core::validate::RANK_ANNOTATION_KEY;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use super::args::DevCommands;
use super::util::print_output;
use super::CliContext;

/// Full workspace contents for `au dev dump`.
#[derive(Debug, Serialize)]
struct WorkspaceDump {
    id: String,
    alias: String,
    todos: Vec<TodoDump>,
}

#[derive(Debug, Serialize)]
struct TodoDump {
    #[serde(flatten)]
    todo: Todo,
    comments: Vec<Comment>,
}

pub fn handle(ctx: &CliContext, command: DevCommands) -> Result<()> {
    match command {
        DevCommands::Dump => {
            let handle = ctx.open_current(false)?;
            let mut todos = Vec::new();
            for todo in handle.document().list_todos()? {
                let comments = handle.document().list_comments(&todo.id)?;
                todos.push(TodoDump { todo, comments });
            }
            todos.sort_by(|a, b| a.todo.id.cmp(&b.todo.id));
            let dump = WorkspaceDump {
                id: handle.meta().id.clone(),
                alias: handle.meta().alias.clone(),
                todos,
            };
            print_output(ctx.format, &dump)
        }
        DevCommands::History => {
            let handle = ctx.open_current(false)?;
            print_output(ctx.format, &handle.document().history())
        }
        DevCommands::HistoryDot => {
            let handle = ctx.open_current(false)?;
            println!("digraph history {{");
            for commit in handle.document().history() {
                let label = commit.message.as_deref().unwrap_or("(no message)");
                println!(
                    "  \"{}\" [label=\"{}\\n{}\"];",
                    commit.hash,
                    &commit.hash[..8.min(commit.hash.len())],
                    label.replace('"', "'"),
                );
                for dep in &commit.deps {
                    println!("  \"{dep}\" -> \"{}\";", commit.hash);
                }
            }
            println!("}}");
            Ok(())
        }
        DevCommands::FakeData { todos } => {
            let author = ctx.require_author()?;
            let mut handle = ctx.open_current(true)?;
            let mut rng = rand::thread_rng();
            for n in 0..todos {
                let verb = FAKE_VERBS.choose(&mut rng).copied().unwrap_or("review");
                let noun = FAKE_NOUNS.choose(&mut rng).copied().unwrap_or("the backlog");
                let mut annotations = BTreeMap::new();
                if rng.gen_bool(0.5) {
                    annotations.insert(
                        RANK_ANNOTATION_KEY.to_string(),
                        rng.gen_range(0..10).to_string(),
                    );
                }
                let todo = handle.document().create_todo(CreateTodoParams {
                    title: format!("{verb} {noun} #{n}"),
                    description: format!("Generated task: {verb} {noun}."),
                    status: Some(
                        if rng.gen_bool(0.3) { "closed" } else { "open" }.to_string(),
                    ),
                    annotations,
                    created_by: author.clone(),
                })?;
                if rng.gen_bool(0.4) {
                    handle.document().create_comment(
                        &todo.id,
                        CreateCommentParams {
                            media_type: "text/markdown".to_string(),
                            content: format!("Don't forget to {verb} {noun}.").into_bytes(),
                            created_by: author.clone(),
                        },
                    )?;
                }
            }
            handle.flush()?;
            handle.close();
            println!("Generated {todos} todos.");
            Ok(())
        }
    }
}

const FAKE_VERBS: &[&str] = &[
    "review", "refactor", "document", "ship", "triage", "benchmark", "deprecate", "test",
];

const FAKE_NOUNS: &[&str] = &[
    "the parser",
    "the sync engine",
    "the release notes",
    "the onboarding flow",
    "the storage layer",
    "the error messages",
    "the dashboard",
    "the backlog",
];
