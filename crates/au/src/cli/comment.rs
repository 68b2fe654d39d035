//! Comment command handlers.

use anyhow::{bail, Context, Result};
use au_core::model::{Comment, CreateCommentParams, EditCommentParams};
use au_core::validate::DEFAULT_COMMENT_MEDIA_TYPE;
use base64::Engine;
use serde::Serialize;

use super::args::CommentCommands;
use super::util::{confirm, print_output};
use super::CliContext;
use crate::editor::edit_content;

/// A comment as rendered on the terminal: markdown content inline, other
/// media types base64-encoded.
#[derive(Debug, Serialize)]
struct CommentView {
    id: String,
    media_type: String,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
    created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_by: Option<String>,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        let content = if comment.media_type == DEFAULT_COMMENT_MEDIA_TYPE {
            String::from_utf8_lossy(&comment.content).into_owned()
        } else {
            base64::engine::general_purpose::STANDARD.encode(&comment.content)
        };
        Self {
            id: comment.id,
            media_type: comment.media_type,
            content,
            created_at: comment.created_at,
            created_by: comment.created_by,
            updated_at: comment.updated_at,
            updated_by: comment.updated_by,
        }
    }
}

/// Resolve the comment content from the flags: markdown comes from
/// `--content` or the editor, anything else reads the `--content` path as
/// raw bytes.
fn resolve_content(
    media_type: &str,
    content: Option<String>,
    edit: bool,
    initial: &str,
) -> Result<Vec<u8>> {
    if media_type == DEFAULT_COMMENT_MEDIA_TYPE {
        if edit {
            let seed = content.as_deref().unwrap_or(initial);
            return Ok(edit_content(seed, ".md")?.into_bytes());
        }
        let Some(content) = content else {
            bail!("provide --content or --edit for markdown comments");
        };
        Ok(content.into_bytes())
    } else {
        let Some(path) = content else {
            bail!("provide --content with a file path for '{media_type}' comments");
        };
        std::fs::read(&path).with_context(|| format!("failed to read '{path}'"))
    }
}

pub fn handle(ctx: &CliContext, command: CommentCommands) -> Result<()> {
    match command {
        CommentCommands::Create {
            todo_id,
            media_type,
            content,
            edit,
        } => {
            let author = ctx.require_author()?;
            let content = resolve_content(&media_type, content, edit, "")?;
            let mut handle = ctx.open_current(true)?;
            let comment = handle.document().create_comment(
                &todo_id,
                CreateCommentParams {
                    media_type,
                    content,
                    created_by: author,
                },
            )?;
            handle.flush()?;
            handle.close();
            print_output(ctx.format, &CommentView::from(comment))
        }
        CommentCommands::List { todo_id } => {
            let handle = ctx.open_current(false)?;
            let mut comments = handle.document().list_comments(&todo_id)?;
            comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            let views: Vec<CommentView> = comments.into_iter().map(Into::into).collect();
            print_output(ctx.format, &views)
        }
        CommentCommands::Get {
            todo_id,
            comment_id,
        } => {
            let handle = ctx.open_current(false)?;
            let comment = handle.document().get_comment(&todo_id, &comment_id)?;
            print_output(ctx.format, &CommentView::from(comment))
        }
        CommentCommands::Edit {
            todo_id,
            comment_id,
            content,
            edit,
        } => {
            let author = ctx.require_author()?;
            let mut handle = ctx.open_current(true)?;
            let existing = handle.document().get_comment(&todo_id, &comment_id)?;
            let initial = String::from_utf8_lossy(&existing.content).into_owned();
            let content = resolve_content(&existing.media_type, content, edit, &initial)?;
            let comment = handle.document().edit_comment(
                &todo_id,
                &comment_id,
                EditCommentParams {
                    content,
                    updated_by: author,
                },
            )?;
            handle.flush()?;
            handle.close();
            print_output(ctx.format, &CommentView::from(comment))
        }
        CommentCommands::Delete {
            todo_id,
            comment_id,
            yes,
        } => {
            let mut handle = ctx.open_current(true)?;
            handle.document().get_comment(&todo_id, &comment_id)?;
            if !confirm(
                &format!("Delete comment {comment_id} on todo {todo_id}?"),
                yes,
            )? {
                bail!("aborted");
            }
            handle.document().delete_comment(&todo_id, &comment_id)?;
            handle.flush()?;
            handle.close();
            Ok(())
        }
    }
}
