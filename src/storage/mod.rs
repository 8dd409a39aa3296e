//! Durable conversation storage
//!
//! [`ConversationStore`] is the caller-facing API. It composes the
//! file-backed [`RecordStore`] with the derived [`SearchIndex`] and keeps the
//! two consistent: every successful save or delete on the record side is
//! followed by the matching index update.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ChatkeepError, EntityKind, Result};
use crate::metrics::OperationTimer;

pub mod atomic;
pub mod index;
pub mod records;
pub mod types;

pub use index::{IndexStats, RebuildReport, SearchIndex, SkippedRecord};
pub use records::{validate_id, Fingerprint, RecordStore};
pub use types::{Conversation, ConversationSummary, Message, Metadata, Role, LANGUAGE_KEY};

/// Attempts at drawing an unused id before giving up
const MAX_ID_ATTEMPTS: usize = 8;

/// Shortest prefix accepted by [`ConversationStore::resolve`]
pub const MIN_PREFIX_LEN: usize = 4;

/// What happened to one conversation of an imported file
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Stored under its original id
    Imported,
    /// Not stored, with the reason
    Failed(String),
}

/// One entry of an [`import_many`](ConversationStore::import_many) report
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    /// Conversation id from the file
    pub id: String,
    /// Title from the file
    pub title: String,
    /// What happened to it
    pub outcome: ImportOutcome,
}

/// Conversation storage backed by one JSON file per conversation
///
/// All methods take `&self`; the search index lives behind a mutex so the
/// store can be shared between threads. Writers to a single record are
/// expected to be serialized by the caller: the last completed save wins.
#[derive(Debug)]
pub struct ConversationStore {
    records: RecordStore,
    index: Mutex<SearchIndex>,
}

impl ConversationStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    ///
    /// The persisted search index is loaded, or rebuilt from the records if
    /// it is missing, corrupted or stale.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::storage::ConversationStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = ConversationStore::open(dir.path()).unwrap();
    /// let conversation = store.create("Release planning", "ai/gemma3").unwrap();
    /// store.save(&conversation).unwrap();
    /// assert_eq!(store.list().unwrap().len(), 1);
    /// ```
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let records = RecordStore::open(dir)?;
        let index = SearchIndex::open(&records)?;
        tracing::debug!(
            "Opened conversation store at {} ({} conversations)",
            records.dir().display(),
            index.len()
        );
        Ok(Self {
            records,
            index: Mutex::new(index),
        })
    }

    /// Directory holding the conversation records
    pub fn dir(&self) -> &Path {
        self.records.dir()
    }

    fn index(&self) -> MutexGuard<'_, SearchIndex> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a new, empty conversation with a fresh id
    ///
    /// The conversation is not persisted until [`save`](Self::save) is called.
    pub fn create(&self, title: &str, model: &str) -> Result<Conversation> {
        let index = self.index();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = uuid::Uuid::new_v4().to_string();
            if index.contains(&id) || self.records.exists(&id) {
                tracing::debug!("Conversation id {} already taken, drawing another", id);
                continue;
            }
            return Ok(Conversation::new(id, title, model));
        }
        Err(ChatkeepError::Validation(format!(
            "could not allocate a unique conversation id after {} attempts",
            MAX_ID_ATTEMPTS
        ))
        .into())
    }

    /// Append a message and return the updated conversation
    ///
    /// Does not persist.
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` for an unknown role.
    pub fn append_message(
        &self,
        mut conversation: Conversation,
        role: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<Conversation> {
        conversation.append_message(role, content, metadata)?;
        Ok(conversation)
    }

    /// Persist a conversation and refresh its index entry
    ///
    /// The record is written atomically first; the index is only touched once
    /// the rename has succeeded. A failure to persist the index file is
    /// logged and recovered on the next open.
    pub fn save(&self, conversation: &Conversation) -> Result<()> {
        let timer = OperationTimer::start("save");
        let fingerprint = timer.observe(self.records.write(conversation))?;

        let mut index = self.index();
        index.update(conversation, Some(fingerprint));
        if let Err(e) = index.persist() {
            tracing::warn!(
                "Saved conversation {} but failed to persist search index: {}",
                conversation.id(),
                e
            );
        }
        tracing::debug!(
            "Saved conversation {} ({} messages)",
            conversation.id(),
            conversation.messages().len()
        );
        Ok(())
    }

    /// Load a conversation by id
    ///
    /// # Errors
    ///
    /// - `ChatkeepError::NotFound` if no record exists
    /// - `ChatkeepError::Validation` if the stored document is malformed, or
    ///   if `id` could never name a record (empty, too long, or containing
    ///   anything but ASCII letters, digits, `-` and `_`, e.g. `"a b"`)
    /// - `ChatkeepError::Io` if the record exists but cannot be read
    pub fn load(&self, id: &str) -> Result<Conversation> {
        OperationTimer::start("load").observe(self.records.read(id))
    }

    /// Load several conversations, reporting failures per id
    pub fn load_many(&self, ids: &[String]) -> Vec<(String, Result<Conversation>)> {
        ids.iter()
            .map(|id| {
                let result = self.load(id);
                if let Err(e) = &result {
                    tracing::warn!("Could not load conversation {}: {}", id, e);
                }
                (id.clone(), result)
            })
            .collect()
    }

    /// Summaries of every stored conversation, most recently updated first
    pub fn list(&self) -> Result<Vec<ConversationSummary>> {
        let timer = OperationTimer::start("list");
        let summaries = self.index().summaries();
        timer.success();
        Ok(summaries)
    }

    /// Remove a conversation and its index entries
    ///
    /// Deleting an unknown id is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        let timer = OperationTimer::start("delete");
        let removed = timer.observe(self.records.remove(id))?;

        let mut index = self.index();
        let indexed = index.remove(id);
        if indexed {
            if let Err(e) = index.persist() {
                tracing::warn!(
                    "Deleted conversation {} but failed to persist search index: {}",
                    id,
                    e
                );
            }
        }
        if removed || indexed {
            tracing::debug!("Deleted conversation {}", id);
        } else {
            tracing::debug!("Delete of unknown conversation {} ignored", id);
        }
        Ok(())
    }

    /// Ids of conversations containing every token of `query`
    ///
    /// Most recently updated first; an empty query matches nothing.
    pub fn search(&self, query: &str) -> Result<Vec<String>> {
        let timer = OperationTimer::start("search");
        let ids = self.index().search(query);
        timer.success();
        Ok(ids)
    }

    /// Like [`search`](Self::search), returning listing summaries
    pub fn search_summaries(&self, query: &str) -> Result<Vec<ConversationSummary>> {
        let index = self.index();
        Ok(index
            .search(query)
            .iter()
            .filter_map(|id| index.summary(id).cloned())
            .collect())
    }

    /// Resolve a full id or a unique id prefix
    ///
    /// # Errors
    ///
    /// - `ChatkeepError::NotFound` if nothing matches
    /// - `ChatkeepError::Validation` if the prefix is shorter than
    ///   [`MIN_PREFIX_LEN`] or matches more than one conversation
    pub fn resolve(&self, prefix: &str) -> Result<String> {
        validate_id(prefix)?;
        if self.records.exists(prefix) {
            return Ok(prefix.to_string());
        }
        if prefix.len() < MIN_PREFIX_LEN {
            return Err(ChatkeepError::Validation(format!(
                "id prefix '{}' is too short (need at least {} characters)",
                prefix, MIN_PREFIX_LEN
            ))
            .into());
        }

        let mut matches = self.index().ids_with_prefix(prefix);
        match matches.len() {
            0 => Err(ChatkeepError::NotFound {
                kind: EntityKind::Conversation,
                id: prefix.to_string(),
            }
            .into()),
            1 => Ok(matches.remove(0)),
            n => Err(ChatkeepError::Validation(format!(
                "id prefix '{}' is ambiguous ({} conversations match)",
                prefix, n
            ))
            .into()),
        }
    }

    /// Store a conversation read from a structured export
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` if the file is not a structured
    /// export or a conversation with the same id already exists.
    pub fn import(&self, path: &Path) -> Result<Conversation> {
        let conversation = crate::export::read_structured(path)?;
        self.store_imported(&conversation)?;
        tracing::info!(
            "Imported conversation {} from {}",
            conversation.id(),
            path.display()
        );
        Ok(conversation)
    }

    /// Store every conversation of a structured export or collection
    ///
    /// The file must parse completely before anything is stored. After that,
    /// each conversation is imported on its own: one whose id already exists
    /// is reported as `Failed` and the rest are still stored.
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` or `ChatkeepError::Io` if the file
    /// cannot be read as a structured export; nothing is stored then.
    pub fn import_many(&self, path: &Path) -> Result<Vec<ImportItem>> {
        let conversations = crate::export::read_structured_all(path)?;
        let items: Vec<ImportItem> = conversations
            .into_iter()
            .map(|conversation| {
                let outcome = match self.store_imported(&conversation) {
                    Ok(()) => ImportOutcome::Imported,
                    Err(e) => {
                        tracing::warn!(
                            "Could not import conversation {}: {:#}",
                            conversation.id(),
                            e
                        );
                        ImportOutcome::Failed(format!("{:#}", e))
                    }
                };
                ImportItem {
                    id: conversation.id().to_string(),
                    title: conversation.title().to_string(),
                    outcome,
                }
            })
            .collect();

        let imported = items
            .iter()
            .filter(|i| i.outcome == ImportOutcome::Imported)
            .count();
        tracing::info!(
            "Imported {} of {} conversations from {}",
            imported,
            items.len(),
            path.display()
        );
        Ok(items)
    }

    fn store_imported(&self, conversation: &Conversation) -> Result<()> {
        validate_id(conversation.id())?;
        if self.records.exists(conversation.id()) {
            return Err(ChatkeepError::Validation(format!(
                "conversation {} already exists",
                conversation.id()
            ))
            .into());
        }
        self.save(conversation)
    }

    /// Recompute the search index from a full scan of the records
    pub fn rebuild_index(&self) -> Result<RebuildReport> {
        let timer = OperationTimer::start("rebuild_index");
        timer.observe(self.index().rebuild(&self.records))
    }

    /// Size and location of the search index
    pub fn index_stats(&self) -> IndexStats {
        self.index().stats()
    }
}
