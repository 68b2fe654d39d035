//! The workspace document model.
//!
//! A workspace is a single CRDT document holding a map of todos, each of
//! which may hold a map of comments. [`WorkspaceDocument`] maps those
//! entities onto automerge containers and serializes all mutation behind a
//! per-document mutex; [`splice`] implements the minimal text diff used for
//! collaborative title and description edits.

mod document;
mod splice;

pub use document::{CommitInfo, WorkspaceDocument};
pub use splice::{diff_splice, Splice};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A todo as read out of a workspace document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    /// ULID of this todo within its workspace
    pub id: String,
    /// Title, a collaborative text field
    pub title: String,
    /// Free-form description, a collaborative text field
    pub description: String,
    /// `open` or `closed`
    pub status: String,
    /// Creation time, second precision UTC
    pub created_at: DateTime<Utc>,
    /// Author identity of the creator (`Name <local@host>`)
    pub created_by: String,
    /// Present iff the todo has been edited at least once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Present iff the todo has been edited at least once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// URI-keyed annotations; values are non-empty strings
    pub annotations: BTreeMap<String, String>,
    /// Number of comments attached to this todo
    pub comment_count: usize,
}

/// A comment as read out of a todo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    /// ULID of this comment within its todo
    pub id: String,
    /// RFC 2045 media type of the content
    pub media_type: String,
    /// Raw content bytes; unicode-validated text iff `media_type` is
    /// `text/markdown`
    #[serde(skip_serializing)]
    pub content: Vec<u8>,
    /// Creation time, second precision UTC
    pub created_at: DateTime<Utc>,
    /// Author identity of the creator
    pub created_by: String,
    /// Present iff the comment has been edited at least once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Present iff the comment has been edited at least once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Inputs for creating a todo. Title and description are validated and
/// cleaned before the document is touched.
#[derive(Debug, Clone, Default)]
pub struct CreateTodoParams {
    /// Title, 3-200 characters after trim
    pub title: String,
    /// Description, up to 5000 characters
    pub description: String,
    /// Initial status; defaults to `open`
    pub status: Option<String>,
    /// Initial annotations; values must be non-empty
    pub annotations: BTreeMap<String, String>,
    /// Author identity recorded as `created_by`
    pub created_by: String,
}

/// Inputs for editing a todo. `None` fields are left untouched; annotation
/// entries with an empty value delete the key.
#[derive(Debug, Clone, Default)]
pub struct EditTodoParams {
    /// Replacement title, if any
    pub title: Option<String>,
    /// Replacement description, if any
    pub description: Option<String>,
    /// Replacement status, if any
    pub status: Option<String>,
    /// Annotation upserts (non-empty value) and deletes (empty value)
    pub annotations: BTreeMap<String, String>,
    /// Author identity recorded as `updated_by`
    pub updated_by: String,
}

/// Inputs for creating a comment on a todo.
#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    /// RFC 2045 media type; `text/markdown` content is unicode-validated
    pub media_type: String,
    /// Content bytes, must be non-empty
    pub content: Vec<u8>,
    /// Author identity recorded as `created_by`
    pub created_by: String,
}

/// Inputs for editing a comment. The content is replaced wholesale; the
/// media type is immutable.
#[derive(Debug, Clone)]
pub struct EditCommentParams {
    /// Replacement content bytes, validated against the stored media type
    pub content: Vec<u8>,
    /// Author identity recorded as `updated_by`
    pub updated_by: String,
}

/// Metadata about a stored workspace, as returned by listing operations.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceMeta {
    /// ULID of the workspace
    pub id: String,
    /// Human-readable label
    pub alias: String,
    /// Creation time, second precision UTC
    pub created_at: DateTime<Utc>,
    /// Size of the serialized document on disk
    pub size_bytes: u64,
    /// Default author configured for the store, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_author: Option<String>,
}
