//! Inverted token index and listing cache over stored conversations
//!
//! The index is a derived cache: everything in it can be recomputed from a
//! full scan of the [`RecordStore`]. It is persisted to `.index.json` in the
//! record directory so listing and searching do not have to open every
//! record, and it is rebuilt whenever that file is missing, unreadable or out
//! of step with the records on disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;
use super::records::{Fingerprint, RecordStore};
use super::types::{Conversation, ConversationSummary};
use crate::error::{ChatkeepError, Result};

/// File name of the persisted index inside the record directory
pub const INDEX_FILE: &str = ".index.json";

const INDEX_VERSION: u32 = 1;

/// Split text into case-folded alphanumeric tokens
///
/// Any character that is not alphanumeric separates tokens, so
/// `"Deploy-to-prod!"` yields `deploy`, `to` and `prod`.
///
/// # Examples
///
/// ```
/// use chatkeep::storage::index::tokenize;
///
/// let tokens = tokenize("Deploy-to-PROD, deploy again");
/// assert!(tokens.contains("deploy"));
/// assert!(tokens.contains("prod"));
/// assert_eq!(tokens.len(), 4);
/// ```
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn conversation_tokens(conversation: &Conversation) -> BTreeSet<String> {
    let mut tokens = tokenize(conversation.title());
    for message in conversation.messages() {
        tokens.extend(tokenize(message.content()));
    }
    tokens
}

/// Cached state for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Listing metadata
    pub summary: ConversationSummary,
    /// Tokens of the title and every message
    pub tokens: BTreeSet<String>,
    /// Record fingerprint when the entry was computed
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    version: u32,
    entries: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    skipped: BTreeMap<String, Option<Fingerprint>>,
}

/// A record that could not be indexed during a rebuild
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Identifier of the record
    pub id: String,
    /// Why it was skipped
    pub reason: String,
}

/// Result of a full index rebuild
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
    /// Number of conversations indexed
    pub indexed: usize,
    /// Records that failed to load
    pub skipped: Vec<SkippedRecord>,
}

/// Index size and location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    /// Number of cached conversations
    pub conversations: usize,
    /// Number of distinct tokens
    pub tokens: usize,
    /// Records on disk that could not be indexed
    pub skipped: usize,
    /// Where the index is persisted
    pub path: Option<PathBuf>,
    /// Whether the index file currently exists
    pub file_exists: bool,
}

/// Token → conversation ids, plus a metadata cache for listing
#[derive(Debug, Default)]
pub struct SearchIndex {
    path: Option<PathBuf>,
    entries: BTreeMap<String, IndexEntry>,
    postings: HashMap<String, BTreeSet<String>>,
    // Unloadable records and their fingerprints at the last rebuild
    skipped: BTreeMap<String, Option<Fingerprint>>,
}

impl SearchIndex {
    /// An empty index that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read a persisted index file
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::IndexCorruption` if the file is missing,
    /// unreadable, unparsable or of an unknown version.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ChatkeepError::IndexCorruption(format!("cannot read {}: {}", path.display(), e))
        })?;
        let document: IndexDocument = serde_json::from_slice(&bytes).map_err(|e| {
            ChatkeepError::IndexCorruption(format!("cannot parse {}: {}", path.display(), e))
        })?;
        if document.version != INDEX_VERSION {
            return Err(ChatkeepError::IndexCorruption(format!(
                "unsupported index version {} in {}",
                document.version,
                path.display()
            ))
            .into());
        }

        let mut index = Self {
            path: Some(path.to_path_buf()),
            skipped: document.skipped,
            ..Self::default()
        };
        for (id, entry) in document.entries {
            if entry.summary.id != id {
                return Err(ChatkeepError::IndexCorruption(format!(
                    "entry {} describes conversation {}",
                    id, entry.summary.id
                ))
                .into());
            }
            index.insert_entry(id, entry);
        }
        Ok(index)
    }

    /// Load the persisted index for `records`, rebuilding it when needed
    ///
    /// A missing, corrupted or stale index file is not an error: it is
    /// rebuilt from a full scan and written back.
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Io` only if the record directory itself
    /// cannot be scanned.
    pub fn open(records: &RecordStore) -> Result<Self> {
        let path = records.dir().join(INDEX_FILE);

        let mut index = match Self::load(&path) {
            Ok(index) => {
                if index.is_stale(records)? {
                    tracing::warn!("Search index at {} is out of date, rebuilding", path.display());
                    Self::rebuild_at(&path, records)?
                } else {
                    tracing::debug!(
                        "Loaded search index with {} conversations from {}",
                        index.len(),
                        path.display()
                    );
                    index
                }
            }
            Err(e) => {
                if path.exists() {
                    tracing::warn!("{}; rebuilding", e);
                } else {
                    tracing::debug!("No search index at {}, building one", path.display());
                }
                Self::rebuild_at(&path, records)?
            }
        };
        index.path = Some(path);
        Ok(index)
    }

    fn rebuild_at(path: &Path, records: &RecordStore) -> Result<Self> {
        let mut index = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };
        index.rebuild(records)?;
        Ok(index)
    }

    /// Whether the cached entries disagree with the records on disk
    ///
    /// The index is stale when the set of record ids differs from the
    /// indexed plus skipped ids, or when any record's fingerprint differs
    /// from the one cached for it. A record that was skipped as unloadable
    /// and has not changed since does not make the index stale.
    pub fn is_stale(&self, records: &RecordStore) -> Result<bool> {
        let ids = records.ids()?;
        if ids.len() != self.entries.len() + self.skipped.len() {
            return Ok(true);
        }
        for id in &ids {
            let cached = match (self.entries.get(id), self.skipped.get(id)) {
                (Some(entry), _) => entry.fingerprint,
                (None, Some(fingerprint)) => *fingerprint,
                (None, None) => return Ok(true),
            };
            if cached.is_none() || records.fingerprint(id)? != cached {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Recompute the index from scratch with a full scan of `records`
    ///
    /// Records that fail to load are skipped and reported; the rest are
    /// indexed. The result is persisted if the index has a path.
    pub fn rebuild(&mut self, records: &RecordStore) -> Result<RebuildReport> {
        self.entries.clear();
        self.postings.clear();
        self.skipped.clear();

        let mut report = RebuildReport::default();
        for (id, result) in records.scan()? {
            match result {
                Ok(conversation) => {
                    let fingerprint = records.fingerprint(&id)?;
                    self.update(&conversation, fingerprint);
                    report.indexed += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping conversation {} while rebuilding index: {}", id, e);
                    self.skipped.insert(id.clone(), records.fingerprint(&id)?);
                    report.skipped.push(SkippedRecord {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        crate::metrics::record_index_rebuild(report.indexed, report.skipped.len());
        tracing::info!(
            "Rebuilt search index: {} indexed, {} skipped",
            report.indexed,
            report.skipped.len()
        );

        if let Err(e) = self.persist() {
            tracing::warn!("Failed to persist rebuilt search index: {}", e);
        }
        Ok(report)
    }

    /// Refresh the entry for a just-saved conversation
    ///
    /// Stale postings for the id are dropped before the new tokens are added.
    pub fn update(&mut self, conversation: &Conversation, fingerprint: Option<Fingerprint>) {
        let id = conversation.id().to_string();
        self.remove(&id);
        let entry = IndexEntry {
            summary: conversation.summary(),
            tokens: conversation_tokens(conversation),
            fingerprint,
        };
        self.insert_entry(id, entry);
    }

    fn insert_entry(&mut self, id: String, entry: IndexEntry) {
        for token in &entry.tokens {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(id.clone());
        }
        self.entries.insert(id, entry);
    }

    /// Drop a conversation from every posting and the metadata cache
    ///
    /// Also forgets the id if it was recorded as skipped. Returns whether the
    /// id was present in either.
    pub fn remove(&mut self, id: &str) -> bool {
        let was_skipped = self.skipped.remove(id).is_some();
        let Some(entry) = self.entries.remove(id) else {
            return was_skipped;
        };
        for token in &entry.tokens {
            if let Some(ids) = self.postings.get_mut(token) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
        true
    }

    /// Conversations containing every token of `query`
    ///
    /// Matching is whole-token and case-insensitive. Results are ordered by
    /// most recently updated first. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<String> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        // Intersect starting from the rarest token.
        let mut postings: Vec<&BTreeSet<String>> = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match self.postings.get(token) {
                Some(ids) => postings.push(ids),
                None => return Vec::new(),
            }
        }
        postings.sort_by_key(|ids| ids.len());

        let Some((first, rest)) = postings.split_first() else {
            return Vec::new();
        };
        let mut ids: Vec<&String> = first
            .iter()
            .filter(|id| rest.iter().all(|other| other.contains(*id)))
            .collect();

        ids.sort_by(|a, b| {
            let ua = self.entries.get(*a).map(|e| e.summary.updated_at);
            let ub = self.entries.get(*b).map(|e| e.summary.updated_at);
            ub.cmp(&ua).then_with(|| a.cmp(b))
        });
        ids.into_iter().cloned().collect()
    }

    /// Cached listing metadata, most recently updated first
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> =
            self.entries.values().map(|e| e.summary.clone()).collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    /// Cached listing metadata for one conversation
    pub fn summary(&self, id: &str) -> Option<&ConversationSummary> {
        self.entries.get(id).map(|e| &e.summary)
    }

    /// Whether the cache holds an entry for `id`
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Cached ids starting with `prefix`
    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of records the last rebuild could not load
    pub fn skipped_ids(&self) -> impl Iterator<Item = &str> {
        self.skipped.keys().map(String::as_str)
    }

    /// Number of cached conversations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no conversations are cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the index to its file, if it has one
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let document = IndexDocument {
            version: INDEX_VERSION,
            entries: self.entries.clone(),
            skipped: self.skipped.clone(),
        };
        let json = serde_json::to_vec(&document)?;
        write_atomic(path, &json)
    }

    /// Size and location of the index
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            conversations: self.entries.len(),
            tokens: self.postings.len(),
            skipped: self.skipped.len(),
            path: self.path.clone(),
            file_exists: self.path.as_ref().map(|p| p.exists()).unwrap_or(false),
        }
    }
}
