//! Todo command handlers.

use anyhow::{bail, Result};
use au_core::model::{CreateTodoParams, EditTodoParams, Todo};
use au_core::validate::RANK_ANNOTATION_KEY;

use super::args::TodoCommands;
use super::util::{confirm, parse_annotations, print_output};
use super::CliContext;
use crate::editor::edit_content;

/// Sort todos for listing: rank annotation descending, then creation time
/// ascending, then id for stability.
fn listing_order(todos: &mut [Todo]) {
    let rank = |t: &Todo| -> i64 {
        t.annotations
            .get(RANK_ANNOTATION_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };
    todos.sort_by(|a, b| {
        rank(b)
            .cmp(&rank(a))
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

pub fn handle(ctx: &CliContext, command: TodoCommands) -> Result<()> {
    match command {
        TodoCommands::Create {
            title,
            mut description,
            status,
            annotations,
            edit,
        } => {
            let author = ctx.require_author()?;
            if edit {
                description = edit_content(&description, ".md")?;
            }
            let annotations = parse_annotations(&annotations)?;
            let mut handle = ctx.open_current(true)?;
            let todo = handle.document().create_todo(CreateTodoParams {
                title,
                description,
                status,
                annotations,
                created_by: author,
            })?;
            handle.flush()?;
            handle.close();
            print_output(ctx.format, &todo)
        }
        TodoCommands::List => {
            let handle = ctx.open_current(false)?;
            let mut todos = handle.document().list_todos()?;
            listing_order(&mut todos);
            print_output(ctx.format, &todos)
        }
        TodoCommands::Get { id } => {
            let handle = ctx.open_current(false)?;
            let todo = handle.document().get_todo(&id)?;
            print_output(ctx.format, &todo)
        }
        TodoCommands::Edit {
            id,
            title,
            mut description,
            status,
            annotations,
            edit,
        } => {
            let author = ctx.require_author()?;
            let annotations = parse_annotations(&annotations)?;
            let mut handle = ctx.open_current(true)?;
            if edit {
                let current = match &description {
                    Some(d) => d.clone(),
                    None => handle.document().get_todo(&id)?.description,
                };
                description = Some(edit_content(&current, ".md")?);
            }
            let todo = handle.document().edit_todo(
                &id,
                EditTodoParams {
                    title,
                    description,
                    status,
                    annotations,
                    updated_by: author,
                },
            )?;
            handle.flush()?;
            handle.close();
            print_output(ctx.format, &todo)
        }
        TodoCommands::Delete { id, yes } => {
            let mut handle = ctx.open_current(true)?;
            let todo = handle.document().get_todo(&id)?;
            if !confirm(&format!("Delete todo '{}' ({id})?", todo.title), yes)? {
                bail!("aborted");
            }
            handle.document().delete_todo(&id)?;
            handle.flush()?;
            handle.close();
            Ok(())
        }
    }
}
