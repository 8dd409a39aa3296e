//! Chatkeep - conversation storage, templates and export library
//!
//! This library stores model conversations as JSON records on disk, keeps a
//! word index for search, seeds new conversations from parameterized
//! templates and exports conversations to several document formats.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Conversation records, atomic file writes and the search index
//! - `templates`: Template library, placeholder substitution and instantiation
//! - `export`: Renderer registry, export options and batch export
//! - `config`: Configuration management and validation
//! - `metrics`: Operation counters and timings
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use chatkeep::{ConversationStore, Exporter};
//! use chatkeep::export::ExportOptions;
//! use chatkeep::storage::Metadata;
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = ConversationStore::open("data/conversations")?;
//!     let conversation = store.create("Deploy plan", "ai/gemma3")?;
//!     let conversation =
//!         store.append_message(conversation, "user", "When do we deploy?", Metadata::new())?;
//!     store.save(&conversation)?;
//!
//!     let hits = store.search("deploy")?;
//!     assert_eq!(hits, vec![conversation.id().to_string()]);
//!
//!     Exporter::new().export(
//!         &conversation,
//!         "markdown",
//!         std::path::Path::new("exports"),
//!         &ExportOptions::default(),
//!     )?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod storage;
pub mod templates;

// Re-export commonly used types
pub use config::{Config, ModelConfig, ModelConfigProvider};
pub use error::{ChatkeepError, Result};
pub use export::{ExportOptions, Exporter};
pub use storage::{Conversation, ConversationStore, Message, Role};
pub use templates::{InstantiateRequest, Template, TemplateManager};
