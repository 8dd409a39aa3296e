//! Command handlers for the CLI
//!
//! Each submodule turns one group of CLI commands into calls on the library
//! (store, template manager, exporter) and prints the result.

use crate::config::Config;
use crate::error::Result;
use crate::storage::ConversationStore;
use crate::templates::TemplateManager;

pub mod conversations;
pub mod export;
pub mod templates;

/// Open the conversation store under the configured data directory
pub fn open_store(config: &Config) -> Result<ConversationStore> {
    let dir = config.storage.conversations_dir();
    tracing::debug!("Opening conversation store at {}", dir.display());
    ConversationStore::open(dir)
}

/// Open the template library, installing the built-ins when configured
pub fn open_templates(config: &Config) -> Result<TemplateManager> {
    let manager = TemplateManager::open(config.storage.templates_dir())?;
    if config.templates.install_builtin {
        manager.install_builtin()?;
    }
    Ok(manager)
}

/// Shorten text for table cells
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

/// First eight characters of an id
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}
