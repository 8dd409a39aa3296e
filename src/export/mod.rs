//! Conversation export
//!
//! Output formats are [`Renderer`]s registered by name in an [`Exporter`].
//! The exporter resolves a format name or alias, renders the conversation to
//! a string and writes it atomically. Batch exports isolate failures per item
//! and honor a [`CancellationToken`] between items.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{kind_of, ChatkeepError, Result};
use crate::storage::atomic::write_atomic;
use crate::storage::{Conversation, ConversationStore};

pub mod code;
pub mod html;
pub mod json;
pub mod markdown;
pub mod options;
pub mod text;

pub use json::{read_structured, read_structured_all, validate_import_file, DocumentKind, ImportCheck};
pub use options::{ExportOptions, PageSize, PRESETS};

/// Characters of the id appended to default file names
const ID_SUFFIX_LEN: usize = 8;
const MAX_SLUG_LEN: usize = 60;

/// Everything a renderer may consult besides the conversation
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Presentation options
    pub options: &'a ExportOptions,
    /// Cancellation signal, checked between work units
    pub cancel: &'a CancellationToken,
}

impl RenderContext<'_> {
    /// Fail with `ChatkeepError::Cancelled` once cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ChatkeepError::Cancelled.into());
        }
        Ok(())
    }
}

/// An output format
pub trait Renderer: Send + Sync {
    /// Canonical format name
    fn name(&self) -> &'static str;

    /// Other names accepted for this format
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// MIME type of the rendered document
    fn mime_type(&self) -> &'static str;

    /// One-line description for format listings
    fn description(&self) -> &'static str;

    /// Render a whole conversation
    fn render(&self, conversation: &Conversation, ctx: &RenderContext<'_>) -> Result<String>;
}

/// Registered format, as shown by format listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatInfo {
    /// Canonical name
    pub name: String,
    /// Accepted aliases
    pub aliases: Vec<String>,
    /// File extension
    pub extension: String,
    /// MIME type
    pub mime_type: String,
    /// Description
    pub description: String,
}

/// Result of exporting one conversation in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// Written to this path
    Exported(PathBuf),
    /// Could not be loaded, rendered or written
    Failed(String),
    /// Not attempted (or abandoned) because the batch was cancelled
    Cancelled,
}

impl ExportOutcome {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            ExportOutcome::Exported(_) => "exported",
            ExportOutcome::Failed(_) => "failed",
            ExportOutcome::Cancelled => "cancelled",
        }
    }
}

/// One entry of a batch export report
#[derive(Debug, Clone, PartialEq)]
pub struct ExportItem {
    /// Conversation id as requested
    pub id: String,
    /// What happened to it
    pub outcome: ExportOutcome,
}

/// Lowercase, dash-separated rendering of a title for file names
///
/// # Examples
///
/// ```
/// use chatkeep::export::slugify;
///
/// assert_eq!(slugify("Deploy: Friday's Plan!"), "deploy-friday-s-plan");
/// assert_eq!(slugify("???"), "conversation");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "conversation".to_string()
    } else {
        slug
    }
}

/// `<slug(title)>_<first 8 id chars>.<extension>`
pub fn default_filename(conversation: &Conversation, extension: &str) -> String {
    let id: String = conversation.id().chars().take(ID_SUFFIX_LEN).collect();
    format!("{}_{}.{}", slugify(conversation.title()), id, extension)
}

/// File name for one item of a batch, distinct from every name in `taken`
///
/// Starts from [`default_filename`]. On a clash the full id replaces the
/// 8-character prefix, and if that is taken too a `-2`, `-3`, ... counter is
/// appended to the stem. The chosen name is added to `taken`.
pub fn batch_filename(
    conversation: &Conversation,
    extension: &str,
    taken: &mut HashSet<String>,
) -> String {
    let mut name = default_filename(conversation, extension);
    if taken.contains(&name) {
        let stem = format!("{}_{}", slugify(conversation.title()), conversation.id());
        name = format!("{}.{}", stem, extension);
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{}-{}.{}", stem, n, extension);
            n += 1;
        }
    }
    taken.insert(name.clone());
    name
}

/// Per-format report of [`Exporter::export_bundle`]
#[derive(Debug, Clone, PartialEq)]
pub struct BundleReport {
    /// Canonical format name
    pub format: String,
    /// One entry per requested id
    pub items: Vec<ExportItem>,
}

/// Registry of output formats
pub struct Exporter {
    renderers: Vec<Box<dyn Renderer>>,
    lookup: HashMap<String, usize>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("formats", &self.names())
            .finish()
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    /// Registry with the json, markdown, html and text renderers
    pub fn new() -> Self {
        let mut exporter = Self::empty();
        let defaults: Vec<Box<dyn Renderer>> = vec![
            Box::new(json::JsonRenderer),
            Box::new(markdown::MarkdownRenderer),
            Box::new(html::HtmlRenderer),
            Box::new(text::TextRenderer),
        ];
        for renderer in defaults {
            if let Err(e) = exporter.register(renderer) {
                tracing::error!("Failed to register built-in renderer: {}", e);
            }
        }
        exporter
    }

    /// Registry with no formats
    pub fn empty() -> Self {
        Self {
            renderers: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Add a format
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::Validation` if its name or an alias is taken.
    pub fn register(&mut self, renderer: Box<dyn Renderer>) -> Result<()> {
        let mut keys = vec![renderer.name().to_lowercase()];
        keys.extend(renderer.aliases().iter().map(|a| a.to_lowercase()));
        if let Some(taken) = keys.iter().find(|k| self.lookup.contains_key(*k)) {
            return Err(ChatkeepError::Validation(format!(
                "export format name '{}' is already registered",
                taken
            ))
            .into());
        }

        let slot = self.renderers.len();
        for key in keys {
            self.lookup.insert(key, slot);
        }
        tracing::debug!("Registered export format {}", renderer.name());
        self.renderers.push(renderer);
        Ok(())
    }

    /// Canonical names of every registered format, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.renderers.iter().map(|r| r.name().to_string()).collect();
        names.sort();
        names
    }

    /// Describe every registered format, sorted by name
    pub fn formats(&self) -> Vec<FormatInfo> {
        let mut formats: Vec<FormatInfo> = self
            .renderers
            .iter()
            .map(|r| FormatInfo {
                name: r.name().to_string(),
                aliases: r.aliases().iter().map(|a| a.to_string()).collect(),
                extension: r.extension().to_string(),
                mime_type: r.mime_type().to_string(),
                description: r.description().to_string(),
            })
            .collect();
        formats.sort_by(|a, b| a.name.cmp(&b.name));
        formats
    }

    /// Look up a format by name or alias, ignoring case
    ///
    /// # Errors
    ///
    /// Returns `ChatkeepError::UnsupportedFormat` listing the known names.
    pub fn renderer(&self, format: &str) -> Result<&dyn Renderer> {
        self.lookup
            .get(&format.trim().to_lowercase())
            .map(|&slot| self.renderers[slot].as_ref())
            .ok_or_else(|| {
                ChatkeepError::UnsupportedFormat {
                    format: format.to_string(),
                    available: self.names(),
                }
                .into()
            })
    }

    /// Render a conversation to a string without writing it
    pub fn render(
        &self,
        conversation: &Conversation,
        format: &str,
        options: &ExportOptions,
    ) -> Result<String> {
        let renderer = self.renderer(format)?;
        let cancel = CancellationToken::new();
        renderer.render(
            conversation,
            &RenderContext {
                options,
                cancel: &cancel,
            },
        )
    }

    /// Export one conversation
    ///
    /// If `destination` is an existing directory the file is named with
    /// [`default_filename`]; otherwise `destination` is the file path.
    ///
    /// # Errors
    ///
    /// - `ChatkeepError::UnsupportedFormat` for an unknown format
    /// - `ChatkeepError::Io` if the file cannot be written
    pub fn export(
        &self,
        conversation: &Conversation,
        format: &str,
        destination: &Path,
        options: &ExportOptions,
    ) -> Result<PathBuf> {
        let renderer = self.renderer(format)?;
        options.validate()?;
        let path = if destination.is_dir() {
            destination.join(default_filename(conversation, renderer.extension()))
        } else {
            destination.to_path_buf()
        };
        let cancel = CancellationToken::new();
        self.write_rendered(renderer, conversation, path, options, &cancel)
    }

    fn write_rendered(
        &self,
        renderer: &dyn Renderer,
        conversation: &Conversation,
        path: PathBuf,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let ctx = RenderContext { options, cancel };
        ctx.check_cancelled()?;
        let document = renderer.render(conversation, &ctx)?;
        ctx.check_cancelled()?;
        write_atomic(&path, document.as_bytes())?;

        tracing::debug!(
            "Exported conversation {} as {} to {}",
            conversation.id(),
            renderer.name(),
            path.display()
        );
        Ok(path)
    }

    /// Export several stored conversations into `dir`
    ///
    /// Returns one [`ExportItem`] per requested id, in order. A conversation
    /// that cannot be loaded or written is reported as `Failed` and the batch
    /// continues. Once `cancel` fires, the remaining items are reported as
    /// `Cancelled`; files already written are left in place.
    ///
    /// Files are named with [`batch_filename`], so two conversations never
    /// share an output file within one batch.
    ///
    /// # Errors
    ///
    /// Fails up front, before any item is touched, for an unknown format,
    /// invalid options, or an output directory that cannot be created.
    pub fn export_many(
        &self,
        store: &ConversationStore,
        ids: &[String],
        format: &str,
        dir: &Path,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExportItem>> {
        let renderer = self.renderer(format)?;
        options.validate()?;
        std::fs::create_dir_all(dir)
            .map_err(|e| ChatkeepError::io(format!("create export directory {}", dir.display()), e))?;

        let mut taken = HashSet::new();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = if cancel.is_cancelled() {
                ExportOutcome::Cancelled
            } else {
                match store.load(id).and_then(|c| {
                    let path = dir.join(batch_filename(&c, renderer.extension(), &mut taken));
                    self.write_rendered(renderer, &c, path, options, cancel)
                }) {
                    Ok(path) => ExportOutcome::Exported(path),
                    Err(e) if matches!(kind_of(&e), Some(ChatkeepError::Cancelled)) => {
                        ExportOutcome::Cancelled
                    }
                    Err(e) => {
                        tracing::warn!("Export of conversation {} failed: {:#}", id, e);
                        ExportOutcome::Failed(format!("{:#}", e))
                    }
                }
            };
            crate::metrics::record_export(renderer.name(), outcome.label());
            items.push(ExportItem {
                id: id.clone(),
                outcome,
            });
        }

        let exported = items
            .iter()
            .filter(|i| matches!(i.outcome, ExportOutcome::Exported(_)))
            .count();
        tracing::info!(
            "Exported {} of {} conversations as {} to {}",
            exported,
            items.len(),
            renderer.name(),
            dir.display()
        );
        Ok(items)
    }

    /// Export the same conversations once per format into `dir`
    ///
    /// Every format is resolved before anything is written. A format named
    /// twice, directly or through an alias, is exported once. Reports come
    /// back in request order.
    ///
    /// # Errors
    ///
    /// Fails up front with `ChatkeepError::UnsupportedFormat` for an unknown
    /// format and `ChatkeepError::Validation` for an empty format list;
    /// otherwise as [`export_many`](Self::export_many).
    pub fn export_bundle(
        &self,
        store: &ConversationStore,
        ids: &[String],
        formats: &[String],
        dir: &Path,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<BundleReport>> {
        let mut names: Vec<&'static str> = Vec::with_capacity(formats.len());
        for format in formats {
            let name = self.renderer(format)?.name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(ChatkeepError::Validation("no export formats requested".to_string()).into());
        }

        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let items = self.export_many(store, ids, name, dir, options, cancel)?;
            reports.push(BundleReport {
                format: name.to_string(),
                items,
            });
        }
        Ok(reports)
    }
}

/// Write several stored conversations into one structured collection file
///
/// If `destination` is an existing directory the file is named
/// `conversations_<UTC timestamp>.json` inside it. Conversations that cannot
/// be loaded are left out and reported as `Failed`; every included one is
/// reported as `Exported` with the collection path.
///
/// # Errors
///
/// - `ChatkeepError::Validation` if none of the conversations could be loaded
/// - `ChatkeepError::Cancelled` if `cancel` fires first; nothing is written
/// - `ChatkeepError::Io` if the file cannot be written
pub fn export_collection(
    store: &ConversationStore,
    ids: &[String],
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<ExportItem>> {
    let mut conversations = Vec::with_capacity(ids.len());
    let mut failures = HashMap::new();
    for id in ids {
        if cancel.is_cancelled() {
            return Err(ChatkeepError::Cancelled.into());
        }
        match store.load(id) {
            Ok(conversation) => conversations.push(conversation),
            Err(e) => {
                tracing::warn!("Leaving conversation {} out of the collection: {:#}", id, e);
                failures.insert(id.clone(), format!("{:#}", e));
            }
        }
    }
    if conversations.is_empty() {
        return Err(ChatkeepError::Validation(format!(
            "none of the {} conversations could be loaded",
            ids.len()
        ))
        .into());
    }

    let path = if destination.is_dir() {
        destination.join(format!(
            "conversations_{}.json",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ))
    } else {
        destination.to_path_buf()
    };
    let document = json::render_collection(&conversations, cancel)?;
    write_atomic(&path, document.as_bytes())?;
    tracing::info!(
        "Exported {} conversations as a collection to {}",
        conversations.len(),
        path.display()
    );

    let items: Vec<ExportItem> = ids
        .iter()
        .map(|id| {
            let outcome = match failures.get(id).cloned() {
                Some(reason) => ExportOutcome::Failed(reason),
                None => ExportOutcome::Exported(path.clone()),
            };
            crate::metrics::record_export("json-collection", outcome.label());
            ExportItem {
                id: id.clone(),
                outcome,
            }
        })
        .collect();
    Ok(items)
}
