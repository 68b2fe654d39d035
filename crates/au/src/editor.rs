//! Interactive editing of free-form content via an external editor.

use std::io::Write;
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Environment variable naming the preferred editor.
pub const EDITOR_ENVIRONMENT_VARIABLE: &str = "AU_EDITOR";

/// Open `$AU_EDITOR` (falling back to `$EDITOR`) on a temp file seeded with
/// `initial` and return the edited content.
pub fn edit_content(initial: &str, extension: &str) -> Result<String> {
    let editor = std::env::var(EDITOR_ENVIRONMENT_VARIABLE)
        .or_else(|_| std::env::var("EDITOR"))
        .ok()
        .filter(|e| !e.is_empty());
    let Some(editor) = editor else {
        bail!("no editor configured - set $AU_EDITOR or $EDITOR");
    };

    let mut file = tempfile::Builder::new()
        .prefix("au-edit-")
        .suffix(extension)
        .tempfile()
        .context("failed to create editor scratch file")?;
    file.write_all(initial.as_bytes())?;
    file.flush()?;

    let status = Command::new(&editor)
        .arg(file.path())
        .status()
        .with_context(|| format!("failed to launch editor '{editor}'"))?;
    if !status.success() {
        bail!("editor exited with status {status}");
    }

    // read back by path: many editors replace the file instead of writing
    // through the original descriptor
    let edited = std::fs::read_to_string(file.path())?;
    Ok(edited)
}
