//! Automerge-backed workspace document.
//!
//! Maps the workspace / todo / comment entities onto nested automerge
//! containers. Titles and descriptions are text nodes so that concurrent
//! edits merge at the character level; everything else is a plain value.
//! Every mutating operation takes the internal mutex, applies its changes
//! and lands exactly one commit whose message records the verb, entity
//! kind and id, so `au dev history` can replay what happened.

use std::collections::BTreeMap;
use std::sync::Mutex;

use automerge::sync::SyncDoc;
use automerge::transaction::{CommitOptions, Transactable};
use automerge::{sync, AutoCommit, ChangeHash, ObjId, ObjType, ReadDoc, ScalarValue, Value, ROOT};
use chrono::{DateTime, Utc};
use ulid::Ulid;

use super::splice::diff_splice;
use super::{
    Comment, CreateCommentParams, CreateTodoParams, EditCommentParams, EditTodoParams, Todo,
};
use crate::error::{AuError, Result};
use crate::unicode::validate_and_clean_bytes;
use crate::validate::{
    validate_author, validate_todo_annotation_key, validate_todo_description, validate_todo_status,
    validate_todo_title, DEFAULT_COMMENT_MEDIA_TYPE,
};

/// How many fresh ULIDs to draw before giving up on a colliding id.
const ID_ATTEMPTS: usize = 20;

/// One entry of a document's commit history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CommitInfo {
    /// Commit hash, hex encoded
    pub hash: String,
    /// Message recorded with the commit
    pub message: Option<String>,
    /// Commit timestamp, seconds since the epoch
    pub timestamp: i64,
    /// Actor that produced the commit
    pub actor: String,
    /// Hashes of the parent commits
    pub deps: Vec<String>,
}

/// An open workspace document.
///
/// Mutator calls may arrive from multiple threads; the internal mutex
/// serializes them so each operation observes and produces a consistent
/// document state. The sync driver uses the same mutex, which keeps
/// `generate`/`receive` cycles from interleaving with edits.
#[derive(Debug)]
pub struct WorkspaceDocument {
    doc: Mutex<AutoCommit>,
}

impl WorkspaceDocument {
    /// Build a fresh workspace document with the seeded root fields.
    pub fn create(id: &str, alias: &str, created_at: DateTime<Utc>) -> Result<Self> {
        let mut doc = AutoCommit::new();
        doc.put(ROOT, "alias", alias)?;
        doc.put(ROOT, "created_at", timestamp_value(created_at))?;
        doc.put_object(ROOT, "todos", ObjType::Map)?;
        doc.commit_with(CommitOptions::default().with_message(format!("created workspace {id}")));
        Ok(Self {
            doc: Mutex::new(doc),
        })
    }

    /// Load a workspace document from its serialized form.
    pub fn load(data: &[u8]) -> Result<Self> {
        let doc = AutoCommit::load(data).map_err(|e| AuError::Corrupt(e.to_string()))?;
        Ok(Self {
            doc: Mutex::new(doc),
        })
    }

    /// Serialize the current document state.
    pub fn save(&self) -> Vec<u8> {
        self.doc.lock().expect("document mutex poisoned").save()
    }

    /// The root `alias` field, if present and a string.
    pub fn alias(&self) -> Option<String> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        str_field(&doc, &ROOT, "alias")
    }

    /// The root `created_at` field, if present and a timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        time_field(&doc, &ROOT, "created_at")
    }

    /// Assert the root schema of a foreign document: `alias` is a string,
    /// `created_at` is a timestamp and `todos` is a map.
    pub fn assert_root_schema(&self) -> Result<()> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        if str_field(&doc, &ROOT, "alias").is_none() {
            return Err(AuError::Corrupt("'alias' is not a string".to_string()));
        }
        if time_field(&doc, &ROOT, "created_at").is_none() {
            return Err(AuError::Corrupt(
                "'created_at' is not a timestamp".to_string(),
            ));
        }
        if map_field(&doc, &ROOT, "todos").is_none() {
            return Err(AuError::Corrupt("'todos' is not a map".to_string()));
        }
        Ok(())
    }

    /// Current heads of the document.
    pub fn heads(&self) -> Vec<ChangeHash> {
        self.doc.lock().expect("document mutex poisoned").get_heads()
    }

    /// Commit history, oldest first.
    pub fn history(&self) -> Vec<CommitInfo> {
        let mut doc = self.doc.lock().expect("document mutex poisoned");
        doc.get_changes(&[])
            .iter()
            .map(|change| CommitInfo {
                hash: change.hash().to_string(),
                message: change.message().cloned(),
                timestamp: change.timestamp() / 1000,
                actor: change.actor_id().to_string(),
                deps: change.deps().iter().map(|d| d.to_string()).collect(),
            })
            .collect()
    }

    /// Generate every sync message the sync state currently wants to emit.
    pub fn generate_sync_messages(&self, state: &mut sync::State) -> Vec<Vec<u8>> {
        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let mut out = Vec::new();
        while let Some(message) = doc.sync().generate_sync_message(state) {
            out.push(message.encode());
        }
        out
    }

    /// Feed one inbound sync message into the sync state.
    ///
    /// Returns the peer heads the message advertised, for the caller's
    /// caught-up check.
    pub fn receive_sync_message(
        &self,
        state: &mut sync::State,
        data: &[u8],
    ) -> Result<Vec<ChangeHash>> {
        let message = sync::Message::decode(data)
            .map_err(|e| AuError::Corrupt(format!("undecodable sync message: {e}")))?;
        let peer_heads = message.heads.clone();
        let mut doc = self.doc.lock().expect("document mutex poisoned");
        doc.sync().receive_sync_message(state, message)?;
        Ok(peer_heads)
    }

    /// List all todos in arbitrary order.
    pub fn list_todos(&self) -> Result<Vec<Todo>> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let ids: Vec<String> = doc.keys(&todos).collect();
        ids.iter()
            .map(|id| get_todo_inner(&doc, &todos, id))
            .collect()
    }

    /// Fetch a single todo.
    pub fn get_todo(&self, id: &str) -> Result<Todo> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        get_todo_inner(&doc, &todos, id)
    }

    /// Create a todo and return it as stored.
    pub fn create_todo(&self, params: CreateTodoParams) -> Result<Todo> {
        let title = validate_todo_title(&params.title)?;
        let description = validate_todo_description(&params.description)?;
        let status = match &params.status {
            Some(s) => validate_todo_status(s)?,
            None => "open".to_string(),
        };
        for (k, v) in &params.annotations {
            validate_todo_annotation_key(k)
                .map_err(|e| AuError::invalid("annotation key", format!("'{k}': {e}")))?;
            if v.is_empty() {
                return Err(AuError::invalid(
                    "annotation",
                    format!("'{k}' has an empty value"),
                ));
            }
        }
        validate_author(&params.created_by)?;

        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo_id = fresh_id(&doc, &todos, "todo")?;

        let todo = doc.put_object(&todos, todo_id.as_str(), ObjType::Map)?;
        doc.put(&todo, "status", status)?;
        doc.put(&todo, "created_at", timestamp_value(now_second()))?;
        doc.put(&todo, "created_by", params.created_by.as_str())?;
        let title_obj = doc.put_object(&todo, "title", ObjType::Text)?;
        doc.splice_text(&title_obj, 0, 0, &title)?;
        let description_obj = doc.put_object(&todo, "description", ObjType::Text)?;
        doc.splice_text(&description_obj, 0, 0, &description)?;
        let annotations = doc.put_object(&todo, "annotations", ObjType::Map)?;
        for (k, v) in &params.annotations {
            doc.put(&annotations, k.as_str(), v.as_str())?;
        }

        doc.commit_with(CommitOptions::default().with_message(format!("created todo {todo_id}")));
        get_todo_inner(&doc, &todos, &todo_id)
    }

    /// Edit a todo in place and return the updated entity.
    pub fn edit_todo(&self, id: &str, params: EditTodoParams) -> Result<Todo> {
        let title = params.title.as_deref().map(validate_todo_title).transpose()?;
        let description = params
            .description
            .as_deref()
            .map(validate_todo_description)
            .transpose()?;
        let status = params.status.as_deref().map(validate_todo_status).transpose()?;
        for (k, v) in &params.annotations {
            if !v.is_empty() {
                validate_todo_annotation_key(k)
                    .map_err(|e| AuError::invalid("annotation key", format!("'{k}': {e}")))?;
            }
        }
        validate_author(&params.updated_by)?;

        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo = map_field(&doc, &todos, id).ok_or_else(|| AuError::not_found("todo", id))?;

        if let Some(title) = title {
            let obj = text_obj(&doc, &todo, "title")
                .ok_or_else(|| AuError::Corrupt("todo 'title' is not a text node".to_string()))?;
            splice_text_node(&mut doc, &obj, &title)?;
        }
        if let Some(description) = description {
            let obj = text_obj(&doc, &todo, "description").ok_or_else(|| {
                AuError::Corrupt("todo 'description' is not a text node".to_string())
            })?;
            splice_text_node(&mut doc, &obj, &description)?;
        }
        if let Some(status) = status {
            doc.put(&todo, "status", status)?;
        }

        if !params.annotations.is_empty() {
            let annotations = match map_field(&doc, &todo, "annotations") {
                Some(obj) => obj,
                None => doc.put_object(&todo, "annotations", ObjType::Map)?,
            };
            for (k, v) in &params.annotations {
                if v.is_empty() {
                    if doc.get(&annotations, k.as_str())?.is_some() {
                        doc.delete(&annotations, k.as_str())?;
                    }
                } else {
                    doc.put(&annotations, k.as_str(), v.as_str())?;
                }
            }
        }

        doc.put(&todo, "updated_at", timestamp_value(now_second()))?;
        doc.put(&todo, "updated_by", params.updated_by.as_str())?;

        doc.commit_with(CommitOptions::default().with_message(format!("edited todo {id}")));
        get_todo_inner(&doc, &todos, id)
    }

    /// Remove a todo and everything under it.
    pub fn delete_todo(&self, id: &str) -> Result<()> {
        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        if map_field(&doc, &todos, id).is_none() {
            return Err(AuError::not_found("todo", id));
        }
        doc.delete(&todos, id)?;
        doc.commit_with(CommitOptions::default().with_message(format!("deleted todo {id}")));
        Ok(())
    }

    /// List the comments of a todo in arbitrary order.
    pub fn list_comments(&self, todo_id: &str) -> Result<Vec<Comment>> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo =
            map_field(&doc, &todos, todo_id).ok_or_else(|| AuError::not_found("todo", todo_id))?;
        let Some(comments) = map_field(&doc, &todo, "comments") else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = doc.keys(&comments).collect();
        ids.iter()
            .map(|id| get_comment_inner(&doc, &comments, id))
            .collect()
    }

    /// Fetch a single comment of a todo.
    pub fn get_comment(&self, todo_id: &str, comment_id: &str) -> Result<Comment> {
        let doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo =
            map_field(&doc, &todos, todo_id).ok_or_else(|| AuError::not_found("todo", todo_id))?;
        let comments = map_field(&doc, &todo, "comments")
            .ok_or_else(|| AuError::not_found("comment", comment_id))?;
        get_comment_inner(&doc, &comments, comment_id)
    }

    /// Create a comment on a todo, materializing the comments map on first
    /// use.
    pub fn create_comment(&self, todo_id: &str, params: CreateCommentParams) -> Result<Comment> {
        params
            .media_type
            .parse::<mime::Mime>()
            .map_err(|e| AuError::invalid("media type", e.to_string()))?;
        let content = validate_comment_content(&params.media_type, params.content)?;
        validate_author(&params.created_by)?;

        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo =
            map_field(&doc, &todos, todo_id).ok_or_else(|| AuError::not_found("todo", todo_id))?;
        let comments = match map_field(&doc, &todo, "comments") {
            Some(obj) => obj,
            None => doc.put_object(&todo, "comments", ObjType::Map)?,
        };

        let comment_id = fresh_id(&doc, &comments, "comment")?;
        let comment = doc.put_object(&comments, comment_id.as_str(), ObjType::Map)?;
        doc.put(&comment, "created_at", timestamp_value(now_second()))?;
        doc.put(&comment, "created_by", params.created_by.as_str())?;
        doc.put(&comment, "media_type", params.media_type.as_str())?;
        doc.put(&comment, "content", ScalarValue::Bytes(content))?;

        doc.commit_with(
            CommitOptions::default()
                .with_message(format!("created comment {comment_id} in todo {todo_id}")),
        );
        get_comment_inner(&doc, &comments, &comment_id)
    }

    /// Replace a comment's content. Comments are not collaborative text, so
    /// this is a wholesale byte replacement rather than a splice.
    pub fn edit_comment(
        &self,
        todo_id: &str,
        comment_id: &str,
        params: EditCommentParams,
    ) -> Result<Comment> {
        validate_author(&params.updated_by)?;

        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo =
            map_field(&doc, &todos, todo_id).ok_or_else(|| AuError::not_found("todo", todo_id))?;
        let comments = map_field(&doc, &todo, "comments")
            .ok_or_else(|| AuError::not_found("comment", comment_id))?;
        let comment = map_field(&doc, &comments, comment_id)
            .ok_or_else(|| AuError::not_found("comment", comment_id))?;

        let media_type = str_field(&doc, &comment, "media_type")
            .ok_or_else(|| AuError::Corrupt("comment 'media_type' is not a string".to_string()))?;
        let content = validate_comment_content(&media_type, params.content)?;

        doc.put(&comment, "content", ScalarValue::Bytes(content))?;
        doc.put(&comment, "updated_at", timestamp_value(now_second()))?;
        doc.put(&comment, "updated_by", params.updated_by.as_str())?;

        doc.commit_with(
            CommitOptions::default()
                .with_message(format!("edited comment {comment_id} in todo {todo_id}")),
        );
        get_comment_inner(&doc, &comments, comment_id)
    }

    /// Remove a comment from a todo.
    pub fn delete_comment(&self, todo_id: &str, comment_id: &str) -> Result<()> {
        let mut doc = self.doc.lock().expect("document mutex poisoned");
        let todos = todos_map(&doc)?;
        let todo =
            map_field(&doc, &todos, todo_id).ok_or_else(|| AuError::not_found("todo", todo_id))?;
        let comments = map_field(&doc, &todo, "comments")
            .ok_or_else(|| AuError::not_found("comment", comment_id))?;
        if map_field(&doc, &comments, comment_id).is_none() {
            return Err(AuError::not_found("comment", comment_id));
        }
        doc.delete(&comments, comment_id)?;
        doc.commit_with(
            CommitOptions::default()
                .with_message(format!("deleted comment {comment_id} in todo {todo_id}")),
        );
        Ok(())
    }
}

/// UTC now, truncated to second precision.
fn now_second() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

fn timestamp_value(at: DateTime<Utc>) -> ScalarValue {
    ScalarValue::Timestamp(at.timestamp() * 1000)
}

/// Draw up to [`ID_ATTEMPTS`] fresh ULIDs until one is free in `map`.
fn fresh_id(doc: &AutoCommit, map: &ObjId, kind: &'static str) -> Result<String> {
    for _ in 0..ID_ATTEMPTS {
        let id = Ulid::new().to_string();
        if doc.get(map, id.as_str())?.is_none() {
            return Ok(id);
        }
    }
    Err(AuError::Conflict(format!(
        "failed to choose a unique {kind} id"
    )))
}

fn validate_comment_content(media_type: &str, content: Vec<u8>) -> Result<Vec<u8>> {
    if media_type == DEFAULT_COMMENT_MEDIA_TYPE {
        let text = validate_and_clean_bytes(&content, true)
            .map_err(|e| AuError::invalid("content", e.to_string()))?;
        if text.is_empty() {
            return Err(AuError::invalid("content", "content is empty"));
        }
        Ok(text.into_bytes())
    } else if content.is_empty() {
        Err(AuError::invalid("content", "content is empty"))
    } else {
        Ok(content)
    }
}

/// Apply the minimal interior splice turning the node's current string into
/// `replacement`.
fn splice_text_node(doc: &mut AutoCommit, obj: &ObjId, replacement: &str) -> Result<()> {
    let existing = doc.text(obj)?;
    let splice = diff_splice(&existing, replacement);
    if !splice.is_noop() {
        doc.splice_text(obj, splice.offset, splice.remove as isize, &splice.insert)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Kind-dispatch read helpers. The runtime hands back tagged values; these
// centralize the tag checks so read paths treat void or mistyped fields as
// the documented defaults instead of scattering matches everywhere.
// ---------------------------------------------------------------------------

fn todos_map(doc: &AutoCommit) -> Result<ObjId> {
    map_field(doc, &ROOT, "todos")
        .ok_or_else(|| AuError::Corrupt("'todos' is not a map".to_string()))
}

fn map_field(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<ObjId> {
    match doc.get(obj, key).ok().flatten() {
        Some((Value::Object(ObjType::Map), id)) => Some(id),
        _ => None,
    }
}

fn text_obj(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<ObjId> {
    match doc.get(obj, key).ok().flatten() {
        Some((Value::Object(ObjType::Text), id)) => Some(id),
        _ => None,
    }
}

fn str_field(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<String> {
    match doc.get(obj, key).ok().flatten() {
        Some((Value::Scalar(scalar), _)) => match scalar.as_ref() {
            ScalarValue::Str(s) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn text_field(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<String> {
    let id = text_obj(doc, obj, key)?;
    doc.text(&id).ok()
}

fn time_field(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<DateTime<Utc>> {
    match doc.get(obj, key).ok().flatten() {
        Some((Value::Scalar(scalar), _)) => match scalar.as_ref() {
            ScalarValue::Timestamp(ms) => DateTime::from_timestamp(ms.div_euclid(1000), 0),
            _ => None,
        },
        _ => None,
    }
}

fn bytes_field(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<Vec<u8>> {
    match doc.get(obj, key).ok().flatten() {
        Some((Value::Scalar(scalar), _)) => match scalar.as_ref() {
            ScalarValue::Bytes(b) => Some(b.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn get_todo_inner(doc: &AutoCommit, todos: &ObjId, id: &str) -> Result<Todo> {
    let todo = map_field(doc, todos, id).ok_or_else(|| AuError::not_found("todo", id))?;

    let annotations = match map_field(doc, &todo, "annotations") {
        Some(obj) => {
            let mut out = BTreeMap::new();
            let keys: Vec<String> = doc.keys(&obj).collect();
            for key in keys {
                if let Some(value) = str_field(doc, &obj, &key) {
                    out.insert(key, value);
                }
            }
            out
        }
        None => BTreeMap::new(),
    };

    let comment_count = map_field(doc, &todo, "comments")
        .map(|obj| doc.keys(&obj).count())
        .unwrap_or(0);

    Ok(Todo {
        id: id.to_string(),
        title: text_field(doc, &todo, "title").unwrap_or_default(),
        description: text_field(doc, &todo, "description").unwrap_or_default(),
        status: str_field(doc, &todo, "status").unwrap_or_else(|| "open".to_string()),
        created_at: time_field(doc, &todo, "created_at").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        created_by: str_field(doc, &todo, "created_by").unwrap_or_default(),
        updated_at: time_field(doc, &todo, "updated_at"),
        updated_by: str_field(doc, &todo, "updated_by"),
        annotations,
        comment_count,
    })
}

fn get_comment_inner(doc: &AutoCommit, comments: &ObjId, id: &str) -> Result<Comment> {
    let comment = map_field(doc, comments, id).ok_or_else(|| AuError::not_found("comment", id))?;
    Ok(Comment {
        id: id.to_string(),
        media_type: str_field(doc, &comment, "media_type").unwrap_or_default(),
        content: bytes_field(doc, &comment, "content").unwrap_or_default(),
        created_at: time_field(doc, &comment, "created_at").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        created_by: str_field(doc, &comment, "created_by").unwrap_or_default(),
        updated_at: time_field(doc, &comment, "updated_at"),
        updated_by: str_field(doc, &comment, "updated_by"),
    })
}
