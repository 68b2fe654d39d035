//! Resolution of the storage root, current workspace and current author.
//!
//! Each resolver applies the same precedence: an explicit argument wins
//! over the environment variable, which wins over the default. Resolvers
//! only compute values; they never create the storage directory or check
//! that a resolved workspace actually exists — that is the store's job.

use std::path::{Component, Path, PathBuf};

use crate::error::Result;

/// Environment variable overriding the storage root.
pub const DIRECTORY_ENVIRONMENT_VARIABLE: &str = "AU_DIRECTORY";
/// Environment variable overriding the current workspace id.
pub const WORKSPACE_ENVIRONMENT_VARIABLE: &str = "AU_WORKSPACE";
/// Environment variable overriding the current author.
pub const AUTHOR_ENVIRONMENT_VARIABLE: &str = "AU_AUTHOR";

/// Name of the pointer file holding the current workspace id.
pub const CURRENT_WORKSPACE_FILE: &str = "current";
/// Name of the pointer file holding the default author identity.
pub const CURRENT_AUTHOR_FILE: &str = "current_author";

fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    if let Some(rest) = value.strip_prefix("$HOME") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(value)
}

/// Lexically clean a path: resolve `.` and `..` components without touching
/// the filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve the storage root directory.
///
/// Precedence: `flag_value` > `$AU_DIRECTORY` > `$HOME/.au`. The result is
/// expanded, cleaned and absolutized; the directory itself may not exist.
pub fn resolve_storage_root(flag_value: Option<&str>) -> Result<PathBuf> {
    let mut value = flag_value.map(str::to_string).unwrap_or_default();
    if value.is_empty() {
        tracing::debug!(
            "no storage directory provided - falling back to ${}",
            DIRECTORY_ENVIRONMENT_VARIABLE
        );
        value = std::env::var(DIRECTORY_ENVIRONMENT_VARIABLE).unwrap_or_default();
    }
    let mut path = if value.is_empty() {
        tracing::debug!("no storage directory on the environment - falling back to default");
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".au")
    } else {
        expand_home(&value)
    };
    if path.is_relative() {
        path = std::env::current_dir()?.join(path);
    }
    let path = clean(&path);
    tracing::debug!(dir = %path.display(), "storage directory resolved");
    Ok(path)
}

/// Resolve the current workspace id, if any.
///
/// Precedence: `flag_value` > `$AU_WORKSPACE` > the `current` pointer file
/// in the storage root. Returns `None` when nothing is configured; the id
/// is not checked for existence here.
pub fn resolve_current_workspace(root: &Path, flag_value: Option<&str>) -> Result<Option<String>> {
    if let Some(v) = flag_value.filter(|v| !v.is_empty()) {
        return Ok(Some(v.to_string()));
    }
    if let Ok(v) = std::env::var(WORKSPACE_ENVIRONMENT_VARIABLE) {
        if !v.is_empty() {
            return Ok(Some(v));
        }
    }
    match std::fs::read_to_string(root.join(CURRENT_WORKSPACE_FILE)) {
        Ok(raw) => {
            let trimmed = raw.trim().to_string();
            Ok((!trimmed.is_empty()).then_some(trimmed))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolve the current author identity, if any.
///
/// Precedence: `flag_value` > `$AU_AUTHOR` > the `current_author` file in
/// the storage root.
pub fn resolve_current_author(root: &Path, flag_value: Option<&str>) -> Result<Option<String>> {
    if let Some(v) = flag_value.filter(|v| !v.is_empty()) {
        return Ok(Some(v.to_string()));
    }
    if let Ok(v) = std::env::var(AUTHOR_ENVIRONMENT_VARIABLE) {
        if !v.is_empty() {
            return Ok(Some(v));
        }
    }
    match std::fs::read_to_string(root.join(CURRENT_AUTHOR_FILE)) {
        Ok(raw) => {
            let trimmed = raw.trim().to_string();
            Ok((!trimmed.is_empty()).then_some(trimmed))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_argument_wins() {
        let root = resolve_storage_root(Some("/tmp/au-test-root")).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/au-test-root"));
    }

    #[test]
    fn relative_argument_is_absolutized() {
        let root = resolve_storage_root(Some("relative/dir")).unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("relative/dir"));
    }

    #[test]
    fn dot_components_are_cleaned() {
        let root = resolve_storage_root(Some("/tmp/a/./b/../c")).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/a/c"));
    }

    #[test]
    fn workspace_falls_back_to_pointer_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_current_workspace(dir.path(), None).unwrap(),
            None,
            "no pointer file yet"
        );

        std::fs::write(
            dir.path().join(CURRENT_WORKSPACE_FILE),
            "01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA\n",
        )
        .unwrap();
        assert_eq!(
            resolve_current_workspace(dir.path(), None).unwrap().as_deref(),
            Some("01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA")
        );

        // explicit argument still wins
        assert_eq!(
            resolve_current_workspace(dir.path(), Some("OTHER")).unwrap().as_deref(),
            Some("OTHER")
        );
    }

    #[test]
    fn author_falls_back_to_pointer_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CURRENT_AUTHOR_FILE), "Ada <ada@x>\n").unwrap();
        assert_eq!(
            resolve_current_author(dir.path(), None).unwrap().as_deref(),
            Some("Ada <ada@x>")
        );
    }
}
