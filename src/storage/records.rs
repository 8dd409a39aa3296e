//! File-backed conversation records
//!
//! One JSON document per conversation, named `<id>.json`, inside a single
//! directory. All writes go through [`write_atomic`](super::atomic::write_atomic).

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;
use super::types::Conversation;
use crate::error::{ChatkeepError, Result};

/// File extension of conversation records
pub const RECORD_EXTENSION: &str = "json";

/// Longest identifier accepted as a record file name
pub const MAX_ID_LEN: usize = 128;

/// Cheap change detector for a record file
///
/// Captured right after a save and compared on startup to notice records
/// that changed without the search index hearing about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Modification time, nanoseconds since the Unix epoch
    pub modified_nanos: u64,
    /// File size in bytes
    pub len: u64,
}

/// Outcome of reading one record during a bulk scan
pub type ScannedRecord = (String, Result<Conversation>);

/// Reject identifiers that are unsafe to use as file names
///
/// # Errors
///
/// Returns `ChatkeepError::Validation` unless `id` is 1 to 128 characters of
/// ASCII letters, digits, `-` or `_`.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ChatkeepError::Validation(format!("invalid conversation id '{}'", id)).into())
    }
}

/// Durable storage of conversation documents
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open (and create if needed) a record directory
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Io` if the directory cannot be created.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ChatkeepError::io(format!("create record directory {}", dir.display()), e))?;
        Ok(Self { dir })
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `id`
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, RECORD_EXTENSION)))
    }

    /// Whether a record exists for `id`
    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Serialize and atomically write a conversation
    ///
    /// Returns the fingerprint of the written file.
    pub fn write(&self, conversation: &Conversation) -> Result<Fingerprint> {
        let path = self.path_for(conversation.id())?;
        let json = serde_json::to_vec_pretty(conversation)?;
        write_atomic(&path, &json).map_err(|e| {
            e.context(format!("save conversation {}", conversation.id()))
        })?;
        self.fingerprint(conversation.id())?.ok_or_else(|| {
            ChatkeepError::io(
                format!("stat conversation {}", conversation.id()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "record vanished after save"),
            )
            .into()
        })
    }

    /// Read and validate one conversation
    ///
    /// # Errors
    ///
    /// - `ChatkeepError::NotFound` if no record exists
    /// - `ChatkeepError::Validation` if the document is malformed, its id
    ///   does not match its file name, or `id` fails [`validate_id`]
    /// - `ChatkeepError::Io` for any other read failure
    pub fn read(&self, id: &str) -> Result<Conversation> {
        let path = self.path_for(id)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatkeepError::conversation_not_found(id).into());
            }
            Err(e) => return Err(ChatkeepError::io(format!("load conversation {}", id), e).into()),
        };

        let conversation: Conversation = serde_json::from_slice(&bytes).map_err(|e| {
            ChatkeepError::Validation(format!("malformed conversation record {}: {}", id, e))
        })?;

        if conversation.id() != id {
            return Err(ChatkeepError::Validation(format!(
                "record {} contains conversation id {}",
                id,
                conversation.id()
            ))
            .into());
        }
        conversation.validate()?;

        Ok(conversation)
    }

    /// Delete the record for `id`
    ///
    /// Returns whether a file was actually removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ChatkeepError::io(format!("delete conversation {}", id), e).into()),
        }
    }

    /// Identifiers of every record on disk, sorted
    ///
    /// Hidden files (the index, in-flight temp files) and files whose stem
    /// is not a valid id are ignored.
    pub fn ids(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| ChatkeepError::io(format!("scan {}", self.dir.display()), e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ChatkeepError::io(format!("scan {}", self.dir.display()), e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') || validate_id(stem).is_err() {
                continue;
            }
            ids.push(stem.to_string());
        }
        ids.sort();
        Ok(ids)
    }

    /// Fingerprint of the record for `id`, or `None` if it does not exist
    pub fn fingerprint(&self, id: &str) -> Result<Option<Fingerprint>> {
        let path = self.path_for(id)?;
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ChatkeepError::io(format!("stat conversation {}", id), e).into()),
        };
        let modified_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Some(Fingerprint {
            modified_nanos,
            len: meta.len(),
        }))
    }

    /// Read every record, reporting failures per item
    ///
    /// Only a failure to list the directory aborts the scan; a corrupted
    /// record shows up as an `Err` next to its id.
    pub fn scan(&self) -> Result<Vec<ScannedRecord>> {
        Ok(self
            .ids()?
            .into_iter()
            .map(|id| {
                let result = self.read(&id);
                (id, result)
            })
            .collect())
    }
}
