use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use chatkeep::storage::{Conversation, ConversationStore, Metadata};

#[allow(dead_code)]
pub fn create_temp_store() -> (ConversationStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = ConversationStore::open(tmp.path().join("conversations"))
        .expect("failed to open conversation store");
    (store, tmp)
}

/// Create, fill and save a conversation whose messages alternate user/assistant
#[allow(dead_code)]
pub fn saved_conversation(store: &ConversationStore, title: &str, messages: &[&str]) -> Conversation {
    let mut conversation = store
        .create(title, "ai/gemma3")
        .expect("failed to create conversation");
    for (i, content) in messages.iter().enumerate() {
        let role = if i % 2 == 0 { "user" } else { "assistant" };
        conversation = store
            .append_message(conversation, role, content, Metadata::new())
            .expect("failed to append message");
    }
    store.save(&conversation).expect("failed to save conversation");
    conversation
}

#[allow(dead_code)]
pub fn record_path(store: &ConversationStore, id: &str) -> PathBuf {
    store.dir().join(format!("{}.json", id))
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .expect("failed to read directory")
        .map(|e| e.expect("failed to read entry").path())
        .collect();
    files.sort();
    files
}
