//! Lossless structured export
//!
//! A single-conversation document is the stored conversation record plus
//! `exported_at` and `format_version`, so [`read_structured`] can load it
//! back into an equal [`Conversation`]. A collection document carries the
//! same two fields, a `conversation_count` and a `conversations` array of
//! records.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::{RenderContext, Renderer};
use crate::error::{ChatkeepError, Result};
use crate::storage::{validate_id, Conversation};

/// Version written into every structured export
pub const FORMAT_VERSION: u32 = 1;

const EXPORTED_AT_KEY: &str = "exported_at";
const FORMAT_VERSION_KEY: &str = "format_version";
const CONVERSATIONS_KEY: &str = "conversations";
const CONVERSATION_COUNT_KEY: &str = "conversation_count";

/// Shape of a structured export file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// One conversation record
    Conversation,
    /// A `conversations` array with a `conversation_count`
    Collection,
}

/// Findings of [`validate_import_file`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportCheck {
    /// Detected document shape, if the file parsed as a JSON object
    pub kind: Option<DocumentKind>,
    /// Number of conversations in the file
    pub conversation_count: usize,
    /// Titles of the conversations that parsed
    pub titles: Vec<String>,
    /// Problems that would make an import fail
    pub errors: Vec<String>,
    /// Oddities that do not block an import
    pub warnings: Vec<String>,
}

impl ImportCheck {
    /// Whether the file can be imported
    pub fn is_valid(&self) -> bool {
        self.kind.is_some() && self.errors.is_empty()
    }
}

/// Pretty-printed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["structured"]
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn mime_type(&self) -> &'static str {
        "application/json"
    }

    fn description(&self) -> &'static str {
        "Lossless structured export that can be imported again"
    }

    fn render(&self, conversation: &Conversation, ctx: &RenderContext<'_>) -> Result<String> {
        ctx.check_cancelled()?;
        let mut document = serde_json::to_value(conversation)?;
        if let Value::Object(map) = &mut document {
            map.insert(
                EXPORTED_AT_KEY.to_string(),
                Value::from(Utc::now().to_rfc3339()),
            );
            map.insert(FORMAT_VERSION_KEY.to_string(), Value::from(FORMAT_VERSION));
        }
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

/// Render several conversations as one collection document
///
/// # Errors
///
/// Returns `ChatkeepError::Cancelled` if `cancel` fires part way through.
pub fn render_collection(
    conversations: &[Conversation],
    cancel: &CancellationToken,
) -> Result<String> {
    let mut records = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        if cancel.is_cancelled() {
            return Err(ChatkeepError::Cancelled.into());
        }
        records.push(serde_json::to_value(conversation)?);
    }

    let mut document = Map::new();
    document.insert(FORMAT_VERSION_KEY.to_string(), Value::from(FORMAT_VERSION));
    document.insert(
        EXPORTED_AT_KEY.to_string(),
        Value::from(Utc::now().to_rfc3339()),
    );
    document.insert(
        CONVERSATION_COUNT_KEY.to_string(),
        Value::from(records.len()),
    );
    document.insert(CONVERSATIONS_KEY.to_string(), Value::Array(records));
    Ok(serde_json::to_string_pretty(&Value::Object(document))?)
}

/// Load a structured export back into a conversation
///
/// Plain stored records (without export fields) are accepted too, and so is
/// a collection holding exactly one conversation.
///
/// # Errors
///
/// - `ChatkeepError::Io` if the file cannot be read
/// - `ChatkeepError::Validation` if it is not a conversation document, holds
///   more than one conversation or was written by a newer format version
pub fn read_structured(path: &Path) -> Result<Conversation> {
    let mut conversations = read_structured_all(path)?;
    if conversations.len() != 1 {
        return Err(ChatkeepError::Validation(format!(
            "{} holds {} conversations, expected one",
            path.display(),
            conversations.len()
        ))
        .into());
    }
    Ok(conversations.remove(0))
}

/// Load every conversation of a structured export
///
/// Accepts a single-conversation document, a plain stored record or a
/// collection. Either the whole file parses or nothing is returned.
///
/// # Errors
///
/// - `ChatkeepError::Io` if the file cannot be read
/// - `ChatkeepError::Validation` if any conversation is malformed, the
///   declared `conversation_count` disagrees with the array, or the format
///   version is newer than this build understands
pub fn read_structured_all(path: &Path) -> Result<Vec<Conversation>> {
    let mut map = read_object(path)?;
    strip_export_fields(&mut map, path)?;

    let Some(records) = map.remove(CONVERSATIONS_KEY) else {
        let origin = path.display().to_string();
        return Ok(vec![conversation_from(Value::Object(map), &origin)?]);
    };
    let Value::Array(records) = records else {
        return Err(ChatkeepError::Validation(format!(
            "{}: '{}' must be a list",
            path.display(),
            CONVERSATIONS_KEY
        ))
        .into());
    };
    if let Some(declared) = map.get(CONVERSATION_COUNT_KEY).and_then(Value::as_u64) {
        if declared != records.len() as u64 {
            return Err(ChatkeepError::Validation(format!(
                "{} declares {} conversations but holds {}",
                path.display(),
                declared,
                records.len()
            ))
            .into());
        }
    }

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            conversation_from(record, &format!("{} conversation {}", path.display(), i + 1))
        })
        .collect()
}

/// Inspect a file before importing it
///
/// Never fails: an unreadable or malformed file is reported through
/// [`ImportCheck::errors`].
pub fn validate_import_file(path: &Path) -> ImportCheck {
    let mut check = ImportCheck::default();
    let mut map = match read_object(path) {
        Ok(map) => map,
        Err(e) => {
            check.errors.push(format!("{:#}", e));
            return check;
        }
    };
    match strip_export_fields(&mut map, path) {
        Ok(true) => {}
        Ok(false) => check
            .warnings
            .push("no format_version; reading it as a stored record".to_string()),
        Err(e) => {
            check.errors.push(format!("{:#}", e));
            return check;
        }
    }

    let records = match map.remove(CONVERSATIONS_KEY) {
        Some(Value::Array(records)) => {
            check.kind = Some(DocumentKind::Collection);
            match map.get(CONVERSATION_COUNT_KEY).and_then(Value::as_u64) {
                Some(declared) if declared != records.len() as u64 => check.errors.push(format!(
                    "declares {} conversations but holds {}",
                    declared,
                    records.len()
                )),
                Some(_) => {}
                None => check
                    .warnings
                    .push(format!("no {} field", CONVERSATION_COUNT_KEY)),
            }
            records
        }
        Some(_) => {
            check.kind = Some(DocumentKind::Collection);
            check
                .errors
                .push(format!("'{}' must be a list", CONVERSATIONS_KEY));
            return check;
        }
        None => {
            check.kind = Some(DocumentKind::Conversation);
            vec![Value::Object(map)]
        }
    };
    check.conversation_count = records.len();

    let mut seen = HashSet::new();
    for (i, record) in records.into_iter().enumerate() {
        let label = format!("conversation {}", i + 1);
        let conversation: Conversation = match serde_json::from_value(record) {
            Ok(conversation) => conversation,
            Err(e) => {
                check.errors.push(format!("{}: {}", label, e));
                continue;
            }
        };
        if let Err(e) = conversation.validate().and_then(|_| validate_id(conversation.id())) {
            check.errors.push(format!("{}: {}", label, e));
            continue;
        }
        if !seen.insert(conversation.id().to_string()) {
            check
                .errors
                .push(format!("{}: duplicate id {}", label, conversation.id()));
        }
        if conversation.messages().is_empty() {
            check
                .warnings
                .push(format!("{} ({}) has no messages", label, conversation.id()));
        }
        check.titles.push(conversation.title().to_string());
    }
    check
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let bytes = std::fs::read(path)
        .map_err(|e| ChatkeepError::io(format!("read export {}", path.display()), e))?;
    let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
        ChatkeepError::Validation(format!("{} is not valid JSON: {}", path.display(), e))
    })?;
    match document {
        Value::Object(map) => Ok(map),
        _ => Err(ChatkeepError::Validation(format!(
            "{} does not contain a conversation object",
            path.display()
        ))
        .into()),
    }
}

/// Drop `exported_at` and `format_version`, checking the version
///
/// Returns whether the document carried a format version at all.
fn strip_export_fields(map: &mut Map<String, Value>, path: &Path) -> Result<bool> {
    map.remove(EXPORTED_AT_KEY);
    let Some(version) = map.remove(FORMAT_VERSION_KEY) else {
        return Ok(false);
    };
    match version.as_u64() {
        Some(v) if v <= u64::from(FORMAT_VERSION) => Ok(true),
        _ => Err(ChatkeepError::Validation(format!(
            "{} has unsupported format version {}",
            path.display(),
            version
        ))
        .into()),
    }
}

fn conversation_from(record: Value, origin: &str) -> Result<Conversation> {
    let conversation: Conversation = serde_json::from_value(record).map_err(|e| {
        ChatkeepError::Validation(format!("{} is not a conversation export: {}", origin, e))
    })?;
    conversation.validate()?;
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOptions;
    use crate::storage::{Metadata, LANGUAGE_KEY};
    use tokio_util::sync::CancellationToken;

    fn render(conversation: &Conversation) -> String {
        let options = ExportOptions::default();
        let cancel = CancellationToken::new();
        JsonRenderer
            .render(
                conversation,
                &RenderContext {
                    options: &options,
                    cancel: &cancel,
                },
            )
            .unwrap()
    }

    fn rich() -> Conversation {
        let mut c = Conversation::new("c-1", "Structured \"quotes\" & ünïcode", "ai/qwen3");
        c.insert_metadata("tags", serde_json::json!(["a", "b"]));
        c.append_message("system", "Be terse.", Metadata::new()).unwrap();
        let mut meta = Metadata::new();
        meta.insert(LANGUAGE_KEY.to_string(), Value::from("rust"));
        c.append_message("assistant", "fn main() {}\n", meta).unwrap();
        c
    }

    #[test]
    fn test_render_adds_export_fields() {
        let value: Value = serde_json::from_str(&render(&rich())).unwrap();
        assert_eq!(value[FORMAT_VERSION_KEY], Value::from(FORMAT_VERSION));
        assert!(value[EXPORTED_AT_KEY].is_string());
        assert_eq!(value["id"], Value::from("c-1"));
    }

    #[test]
    fn test_read_structured_restores_equal_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let original = rich();
        std::fs::write(&path, render(&original)).unwrap();

        assert_eq!(read_structured(&path).unwrap(), original);
    }

    #[test]
    fn test_read_structured_rejects_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut value: Value = serde_json::from_str(&render(&rich())).unwrap();
        value[FORMAT_VERSION_KEY] = Value::from(99);
        std::fs::write(&path, value.to_string()).unwrap();

        let err = read_structured(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported format version"));
    }

    #[test]
    fn test_read_structured_rejects_non_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = read_structured(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatkeepError>(),
            Some(ChatkeepError::Validation(_))
        ));
    }

    #[test]
    fn test_collection_round_trip_with_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.json");
        let second = Conversation::new("c-2", "Empty one", "ai/gemma3");
        let conversations = vec![rich(), second];
        std::fs::write(
            &path,
            render_collection(&conversations, &CancellationToken::new()).unwrap(),
        )
        .unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[CONVERSATION_COUNT_KEY], Value::from(2));
        assert_eq!(read_structured_all(&path).unwrap(), conversations);

        let err = read_structured(&path).unwrap_err();
        assert!(err.to_string().contains("holds 2 conversations"));

        let check = validate_import_file(&path);
        assert!(check.is_valid(), "{:?}", check.errors);
        assert_eq!(check.kind, Some(DocumentKind::Collection));
        assert_eq!(check.conversation_count, 2);
        assert_eq!(check.warnings, vec!["conversation 2 (c-2) has no messages"]);
    }

    #[test]
    fn test_collection_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.json");
        let mut value: Value = serde_json::from_str(
            &render_collection(&[rich()], &CancellationToken::new()).unwrap(),
        )
        .unwrap();
        value[CONVERSATION_COUNT_KEY] = Value::from(3);
        std::fs::write(&path, value.to_string()).unwrap();

        let err = read_structured_all(&path).unwrap_err();
        assert!(err.to_string().contains("declares 3 conversations but holds 1"));
        assert!(!validate_import_file(&path).is_valid());
    }

    #[test]
    fn test_render_collection_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = render_collection(&[rich()], &cancel).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatkeepError>(),
            Some(ChatkeepError::Cancelled)
        ));
    }

    #[test]
    fn test_validate_import_file_reports_problems() {
        let dir = tempfile::tempdir().unwrap();

        let missing = validate_import_file(&dir.path().join("nope.json"));
        assert!(!missing.is_valid());
        assert_eq!(missing.kind, None);

        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"conversations": [{"id": "a b", "title": "t", "model": "m",
                "created_at": "2025-01-01T00:00:00Z", "updated_at": "2025-01-01T00:00:00Z"},
                {"title": "no id"}]}"#,
        )
        .unwrap();
        let check = validate_import_file(&path);
        assert!(!check.is_valid());
        assert_eq!(check.conversation_count, 2);
        assert_eq!(check.errors.len(), 2);
        assert!(check.errors[0].contains("invalid conversation id"));
        assert!(check.errors[1].starts_with("conversation 2:"));
        assert!(check.warnings.iter().any(|w| w.contains("format_version")));
    }

    #[test]
    fn test_single_document_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, render(&rich())).unwrap();

        let check = validate_import_file(&path);
        assert!(check.is_valid());
        assert_eq!(check.kind, Some(DocumentKind::Conversation));
        assert_eq!(check.titles, vec![rich().title().to_string()]);
        assert!(check.warnings.is_empty());
    }
}
