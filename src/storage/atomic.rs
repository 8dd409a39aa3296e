//! Write-then-rename file persistence
//!
//! Every durable write goes through [`write_atomic`]: the bytes land in a
//! temporary file inside the destination directory, are flushed and synced,
//! and the temporary file is renamed over the destination. A reader sees
//! either the previous document or the new one, never a partial write.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{ChatkeepError, Result};

/// Atomically replace `path` with `contents`
///
/// The parent directory is created if it does not exist yet.
///
/// # Errors
///
/// Returns `ChatkeepError::Io` if the directory cannot be created or the
/// temporary file cannot be written, synced or renamed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = stage(path, contents)?;
    tmp.persist(path)
        .map_err(|e| ChatkeepError::io(format!("rename into {}", path.display()), e.error))?;

    Ok(())
}

/// Atomically create `path`, refusing to replace an existing file
///
/// # Errors
///
/// Returns `ChatkeepError::Validation` if `path` already exists and
/// `ChatkeepError::Io` for any other filesystem failure.
pub fn create_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = stage(path, contents)?;
    tmp.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            anyhow::Error::from(ChatkeepError::Validation(format!(
                "{} already exists",
                path.display()
            )))
        } else {
            ChatkeepError::io(format!("rename into {}", path.display()), e.error).into()
        }
    })?;

    Ok(())
}

/// Write `contents` to a synced temp file next to `path`
fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| ChatkeepError::io(format!("create directory {}", dir.display()), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| ChatkeepError::io(format!("create temp file in {}", dir.display()), e))?;
    tmp.write_all(contents)
        .map_err(|e| ChatkeepError::io(format!("write {}", path.display()), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ChatkeepError::io(format!("sync {}", path.display()), e))?;

    Ok(tmp)
}
