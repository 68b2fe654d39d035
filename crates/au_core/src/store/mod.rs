//! Directory-backed workspace persistence.
//!
//! Each workspace lives in a single `{ULID}.automerge` file inside the
//! storage root. Mutating file operations write a `.temp` sibling and
//! rename it over the target, so a crash leaves either the previous or the
//! new file, never a truncated one. Writeable sessions hold an advisory
//! exclusive lock on a `.lock` sibling for their whole lifetime.

mod lock;

pub use lock::WorkspaceLock;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::config::{CURRENT_AUTHOR_FILE, CURRENT_WORKSPACE_FILE};
use crate::error::{AuError, Result};
use crate::model::{WorkspaceDocument, WorkspaceMeta};
use crate::validate::{validate_author, validate_workspace_alias};

/// Filename suffix of serialized workspace documents.
pub const WORKSPACE_SUFFIX: &str = ".automerge";

const TEMP_SUFFIX: &str = ".temp";
const LOCK_SUFFIX: &str = ".lock";

/// How many fresh ULIDs to draw before giving up on workspace creation.
const ID_ATTEMPTS: usize = 20;

/// A store of workspaces persisted as files in one directory.
#[derive(Debug)]
pub struct DirectoryStore {
    path: PathBuf,
}

impl DirectoryStore {
    /// Open a store at `path`, creating the directory (mode 0700) when it
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match fs::metadata(&path) {
            Ok(meta) if !meta.is_dir() => {
                return Err(AuError::Conflict(format!(
                    "'{}' exists but is not a directory",
                    path.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %path.display(), "creating storage directory");
                fs::create_dir_all(&path)?;
            }
            Err(e) => return Err(e.into()),
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { path })
    }

    /// The storage root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn workspace_path(&self, id: &str) -> PathBuf {
        self.path.join(format!("{id}{WORKSPACE_SUFFIX}"))
    }

    /// Write `data` to `target` atomically: temp sibling (mode 0600) plus
    /// rename.
    fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<()> {
        let temp = PathBuf::from(format!("{}{TEMP_SUFFIX}", target.display()));
        fs::write(&temp, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&temp, target)?;
        Ok(())
    }

    /// List the workspaces in this store, in directory order.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceMeta>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(WORKSPACE_SUFFIX) else {
                continue;
            };
            if Ulid::from_string(stem).is_ok() {
                ids.push(stem.to_string());
            }
        }
        ids.iter().map(|id| self.get_workspace(id)).collect()
    }

    /// Read the metadata of one workspace without taking any lock.
    pub fn get_workspace(&self, id: &str) -> Result<WorkspaceMeta> {
        let handle = self.open_workspace(id, false)?;
        Ok(handle.meta().clone())
    }

    /// Create a new blank workspace and return its metadata.
    ///
    /// The `current` pointer is left untouched; callers decide whether to
    /// switch to the new workspace.
    pub fn create_workspace(&self, alias: &str) -> Result<WorkspaceMeta> {
        let alias = validate_workspace_alias(alias)?;

        let mut chosen = None;
        for _ in 0..ID_ATTEMPTS {
            let proposed = Ulid::new().to_string();
            match fs::metadata(self.workspace_path(&proposed)) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    chosen = Some(proposed);
                    break;
                }
                Err(e) => return Err(e.into()),
                Ok(_) => continue,
            }
        }
        let id = chosen
            .ok_or_else(|| AuError::Conflict("failed to choose a unique workspace id".to_string()))?;

        let created_at = truncate_second(Utc::now());
        let document = WorkspaceDocument::create(&id, &alias, created_at)?;
        let content = document.save();
        self.write_atomic(&self.workspace_path(&id), &content)?;
        tracing::debug!(%id, %alias, "created workspace");

        Ok(WorkspaceMeta {
            id,
            alias,
            created_at,
            size_bytes: content.len() as u64,
            current_author: self.get_current_author()?,
        })
    }

    /// Open a workspace, deserializing its document into memory.
    ///
    /// With `writeable` the advisory lock is acquired first and held by the
    /// returned handle until [`WorkspaceHandle::close`]; a lock already held
    /// elsewhere fails with [`AuError::Conflict`]. Read-only handles load a
    /// snapshot and hold no lock.
    pub fn open_workspace(&self, id: &str, writeable: bool) -> Result<WorkspaceHandle> {
        let path = self.workspace_path(id);

        let lock = if writeable {
            Some(WorkspaceLock::try_acquire(&PathBuf::from(format!(
                "{}{LOCK_SUFFIX}",
                path.display()
            )))?)
        } else {
            None
        };

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuError::not_found("workspace", id));
            }
            Err(e) => return Err(e.into()),
        };
        let document = WorkspaceDocument::load(&raw)?;

        let meta = WorkspaceMeta {
            id: id.to_string(),
            alias: document.alias().unwrap_or_default(),
            created_at: document.created_at().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            size_bytes: raw.len() as u64,
            current_author: self.get_current_author()?,
        };

        Ok(WorkspaceHandle {
            path,
            lock,
            meta,
            document,
        })
    }

    /// Remove a workspace file.
    ///
    /// A dangling `current` pointer is the caller's to detect; this does
    /// not clear it.
    pub fn delete_workspace(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.workspace_path(id)) {
            Ok(()) => {
                tracing::debug!(%id, "deleted workspace");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AuError::not_found("workspace", id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Import a foreign serialized document under the given id.
    ///
    /// The id must be a ULID, the document must load, and its root schema
    /// must hold. Refuses to overwrite an existing workspace; delete it
    /// first.
    pub fn import_workspace(&self, id: &str, data: &[u8]) -> Result<WorkspaceMeta> {
        if Ulid::from_string(id).is_err() {
            return Err(AuError::invalid(
                "workspace id",
                "expected a valid ulid".to_string(),
            ));
        }
        let path = self.workspace_path(id);
        if path.exists() {
            return Err(AuError::Conflict(format!(
                "workspace '{id}' already exists - delete it first"
            )));
        }

        let document = WorkspaceDocument::load(data)?;
        document.assert_root_schema()?;

        let content = document.save();
        self.write_atomic(&path, &content)?;
        tracing::debug!(%id, "imported workspace");

        Ok(WorkspaceMeta {
            id: id.to_string(),
            alias: document.alias().unwrap_or_default(),
            created_at: document.created_at().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            size_bytes: content.len() as u64,
            current_author: self.get_current_author()?,
        })
    }

    /// Read the `current` pointer file, if set.
    pub fn get_current_workspace(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.path.join(CURRENT_WORKSPACE_FILE)) {
            Ok(raw) => {
                let trimmed = raw.trim().to_string();
                Ok((!trimmed.is_empty()).then_some(trimmed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically overwrite the `current` pointer file. An empty id clears
    /// the pointer.
    pub fn set_current_workspace(&self, id: &str) -> Result<()> {
        self.write_atomic(&self.path.join(CURRENT_WORKSPACE_FILE), id.as_bytes())
    }

    /// Read the `current_author` file, if set.
    pub fn get_current_author(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.path.join(CURRENT_AUTHOR_FILE)) {
            Ok(raw) => {
                let trimmed = raw.trim().to_string();
                Ok((!trimmed.is_empty()).then_some(trimmed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and atomically write the `current_author` file.
    pub fn set_current_author(&self, author: &str) -> Result<()> {
        validate_author(author)?;
        self.write_atomic(&self.path.join(CURRENT_AUTHOR_FILE), author.as_bytes())
    }
}

/// An open workspace: the in-memory document plus the file it came from
/// and, for writeable sessions, the held lock.
#[derive(Debug)]
pub struct WorkspaceHandle {
    path: PathBuf,
    lock: Option<WorkspaceLock>,
    meta: WorkspaceMeta,
    document: WorkspaceDocument,
}

impl WorkspaceHandle {
    /// Metadata captured when the workspace was opened.
    pub fn meta(&self) -> &WorkspaceMeta {
        &self.meta
    }

    /// The in-memory document model.
    pub fn document(&self) -> &WorkspaceDocument {
        &self.document
    }

    /// Whether this handle holds the write lock.
    pub fn is_writeable(&self) -> bool {
        self.lock.is_some()
    }

    /// Atomically persist the current document state.
    ///
    /// Permitted only on writeable handles; idempotent when nothing has
    /// changed since the last flush.
    pub fn flush(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(AuError::Conflict(
                "workspace is not locked for writing".to_string(),
            ));
        }
        let content = self.document.save();
        let temp = PathBuf::from(format!("{}{TEMP_SUFFIX}", self.path.display()));
        fs::write(&temp, &content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Release the write lock, if held. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }
}

fn truncate_second(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateTodoParams;

    fn store() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("au")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_then_list_round_trips() {
        let (_dir, store) = store();
        let a = store.create_workspace("Workspace A").unwrap();
        let b = store.create_workspace("Workspace B").unwrap();

        let mut listed = store.list_workspaces().unwrap();
        listed.sort_by(|x, y| x.id.cmp(&y.id));
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        let ids: Vec<String> = listed.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, expected);

        let got = store.get_workspace(&a.id).unwrap();
        assert_eq!(got.alias, "Workspace A");
        assert_eq!(got.created_at, a.created_at);
        assert!(got.size_bytes > 0);
    }

    #[test]
    fn create_validates_the_alias() {
        let (_dir, store) = store();
        assert!(store.create_workspace("   ").is_err());
        assert!(store.create_workspace(&"a".repeat(256)).is_err());
    }

    #[test]
    fn listing_ignores_foreign_files() {
        let (_dir, store) = store();
        let ws = store.create_workspace("Only one").unwrap();
        fs::write(store.path().join("notes.txt"), "not a workspace").unwrap();
        fs::write(store.path().join("bogus.automerge"), "stem is not a ulid").unwrap();
        fs::create_dir(store.path().join("subdir.automerge")).unwrap();

        let listed = store.list_workspaces().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ws.id);
    }

    #[test]
    fn delete_returns_directory_to_previous_contents() {
        let (_dir, store) = store();
        let keep = store.create_workspace("Keeper").unwrap();
        let gone = store.create_workspace("Goner").unwrap();

        store.delete_workspace(&gone.id).unwrap();
        let listed = store.list_workspaces().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);

        assert!(store.delete_workspace(&gone.id).unwrap_err().is_not_found());
    }

    #[test]
    fn open_missing_workspace_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .open_workspace("01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA", false)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn second_writeable_open_conflicts_until_closed() {
        let (_dir, store) = store();
        let ws = store.create_workspace("Contended").unwrap();

        let mut first = store.open_workspace(&ws.id, true).unwrap();
        let err = store.open_workspace(&ws.id, true).unwrap_err();
        assert!(err.is_conflict());

        // readers are unaffected by the write lock
        let _reader = store.open_workspace(&ws.id, false).unwrap();

        first.close();
        let _second = store.open_workspace(&ws.id, true).unwrap();
    }

    #[test]
    fn flush_requires_the_write_lock() {
        let (_dir, store) = store();
        let ws = store.create_workspace("Read only").unwrap();
        let handle = store.open_workspace(&ws.id, false).unwrap();
        assert!(handle.flush().unwrap_err().is_conflict());
    }

    #[test]
    fn mutations_survive_flush_and_reopen() {
        let (_dir, store) = store();
        let ws = store.create_workspace("Durable").unwrap();

        let mut handle = store.open_workspace(&ws.id, true).unwrap();
        let todo = handle
            .document()
            .create_todo(CreateTodoParams {
                title: "Persist me".to_string(),
                description: String::new(),
                status: None,
                annotations: Default::default(),
                created_by: "Ada <ada@x>".to_string(),
            })
            .unwrap();
        handle.flush().unwrap();
        handle.close();

        let reopened = store.open_workspace(&ws.id, false).unwrap();
        let read = reopened.document().get_todo(&todo.id).unwrap();
        assert_eq!(read.title, "Persist me");
    }

    #[test]
    fn flush_leaves_no_temp_file_behind() {
        let (_dir, store) = store();
        let ws = store.create_workspace("Atomic").unwrap();
        let handle = store.open_workspace(&ws.id, true).unwrap();
        handle.flush().unwrap();

        let leftovers: Vec<String> = fs::read_dir(store.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(TEMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn import_round_trips_and_refuses_overwrite() {
        let (_dir, store) = store();
        let ws = store.create_workspace("Source").unwrap();
        let data = fs::read(store.path().join(format!("{}{WORKSPACE_SUFFIX}", ws.id))).unwrap();

        let other_id = Ulid::new().to_string();
        let imported = store.import_workspace(&other_id, &data).unwrap();
        assert_eq!(imported.alias, "Source");

        let err = store.import_workspace(&other_id, &data).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn import_rejects_bad_ids_and_bad_documents() {
        let (_dir, store) = store();
        assert!(store.import_workspace("not-a-ulid", &[]).is_err());

        let id = Ulid::new().to_string();
        assert!(matches!(
            store.import_workspace(&id, b"garbage"),
            Err(AuError::Corrupt(_))
        ));

        // a structurally valid automerge document without the root schema
        let empty = WorkspaceDocument::load(&{
            let mut doc = automerge::AutoCommit::new();
            doc.save()
        })
        .unwrap()
        .save();
        assert!(matches!(
            store.import_workspace(&id, &empty),
            Err(AuError::Corrupt(_))
        ));
    }

    #[test]
    fn current_pointer_files_round_trip() {
        let (_dir, store) = store();
        assert_eq!(store.get_current_workspace().unwrap(), None);

        store.set_current_workspace("01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA").unwrap();
        assert_eq!(
            store.get_current_workspace().unwrap().as_deref(),
            Some("01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA")
        );

        // the empty string clears the pointer
        store.set_current_workspace("").unwrap();
        assert_eq!(store.get_current_workspace().unwrap(), None);

        assert_eq!(store.get_current_author().unwrap(), None);
        assert!(store.set_current_author("nope").is_err());
        store.set_current_author("Ada <ada@x>").unwrap();
        assert_eq!(
            store.get_current_author().unwrap().as_deref(),
            Some("Ada <ada@x>")
        );
    }

    #[cfg(unix)]
    #[test]
    fn files_are_private_by_default() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        let ws = store.create_workspace("Private").unwrap();

        let dir_mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        let file_mode = fs::metadata(store.path().join(format!("{}{WORKSPACE_SUFFIX}", ws.id)))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
