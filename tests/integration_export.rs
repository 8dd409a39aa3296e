//! Integration tests for exporting stored conversations
//!
//! Covers batch export with a damaged record, the structured export/import
//! round trip and every registered format.

use chatkeep::error::{kind_of, ChatkeepError};
use chatkeep::export::{ExportOptions, ExportOutcome, Exporter};
use chatkeep::storage::ConversationStore;
use tokio_util::sync::CancellationToken;
mod common;

#[test]
fn test_export_many_reports_corrupted_second_record() {
    let (store, tmp) = common::create_temp_store();
    let first = common::saved_conversation(&store, "First", &["alpha", "beta"]);
    let second = common::saved_conversation(&store, "Second", &["gamma"]);
    let third = common::saved_conversation(&store, "Third", &["delta"]);
    std::fs::write(common::record_path(&store, second.id()), "{\"id\": 42").unwrap();

    let ids = vec![
        first.id().to_string(),
        second.id().to_string(),
        third.id().to_string(),
    ];
    let out = tmp.path().join("exports");
    let items = Exporter::new()
        .export_many(
            &store,
            &ids,
            "markdown",
            &out,
            &ExportOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[1].id, second.id());
    assert!(matches!(items[1].outcome, ExportOutcome::Failed(_)));
    for item in [&items[0], &items[2]] {
        match &item.outcome {
            ExportOutcome::Exported(path) => {
                assert!(path.starts_with(&out));
                assert_eq!(path.extension().and_then(|e| e.to_str()), Some("md"));
                assert!(path.is_file());
            }
            other => panic!("expected {} to be exported, got {:?}", item.id, other),
        }
    }
    assert_eq!(common::files_in(&out).len(), 2);
}

#[test]
fn test_structured_export_imports_into_fresh_store() {
    let (store, tmp) = common::create_temp_store();
    let mut original = common::saved_conversation(
        &store,
        "Round trip \u{1F680}",
        &["fn main() {}", "Looks fine.\nShip it."],
    );
    original.insert_metadata("tags", serde_json::json!(["rust"]));
    store.save(&original).unwrap();

    let file = Exporter::new()
        .export(
            &original,
            "structured",
            &tmp.path().join("export.json"),
            &ExportOptions::default(),
        )
        .unwrap();

    let other = ConversationStore::open(tmp.path().join("elsewhere")).unwrap();
    let imported = other.import(&file).unwrap();

    assert_eq!(imported, original);
    assert_eq!(other.load(original.id()).unwrap(), original);
    assert_eq!(
        other.search("ship").unwrap(),
        vec![original.id().to_string()]
    );

    // A second import of the same conversation is refused
    let err = other.import(&file).unwrap_err();
    assert!(matches!(kind_of(&err), Some(ChatkeepError::Validation(_))));
}

#[test]
fn test_every_format_writes_a_named_file() {
    let (store, tmp) = common::create_temp_store();
    let conversation = common::saved_conversation(&store, "All formats", &["hello", "world"]);
    let exporter = Exporter::new();

    for info in exporter.formats() {
        let dir = tmp.path().join(&info.name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = exporter
            .export(&conversation, &info.name, &dir, &ExportOptions::default())
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("all-formats_"), "unexpected name {}", name);
        assert!(name.ends_with(&format!(".{}", info.extension)));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("hello"), "{} output lacks content", info.name);
        assert!(body.contains("world"), "{} output lacks content", info.name);
    }
}

#[test]
fn test_unknown_format_names_available_formats() {
    let (store, tmp) = common::create_temp_store();
    let conversation = common::saved_conversation(&store, "Nope", &["x"]);

    let err = Exporter::new()
        .export(
            &conversation,
            "docx",
            tmp.path(),
            &ExportOptions::default(),
        )
        .unwrap_err();

    match kind_of(&err) {
        Some(ChatkeepError::UnsupportedFormat { format, available }) => {
            assert_eq!(format, "docx");
            assert!(available.contains(&"markdown".to_string()));
            assert!(available.contains(&"json".to_string()));
        }
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
    assert!(common::files_in(tmp.path())
        .iter()
        .all(|p| p.extension().and_then(|e| e.to_str()) != Some("docx")));
}

#[test]
fn test_cancelled_batch_writes_nothing() {
    let (store, tmp) = common::create_temp_store();
    let a = common::saved_conversation(&store, "A", &["one"]);
    let b = common::saved_conversation(&store, "B", &["two"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let out = tmp.path().join("cancelled");
    let items = Exporter::new()
        .export_many(
            &store,
            &[a.id().to_string(), b.id().to_string()],
            "html",
            &out,
            &ExportOptions::default(),
            &cancel,
        )
        .unwrap();

    assert!(items
        .iter()
        .all(|i| matches!(i.outcome, ExportOutcome::Cancelled)));
    assert!(common::files_in(&out).is_empty());
}
