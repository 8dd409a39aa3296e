//! Error types for Chatkeep
//!
//! This module defines all error types used throughout the storage,
//! template and export layers, using `thiserror` for ergonomic error handling.

use std::fmt;

use thiserror::Error;

/// What kind of entity a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A stored conversation record
    Conversation,
    /// A conversation template
    Template,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Conversation => write!(f, "conversation"),
            EntityKind::Template => write!(f, "template"),
        }
    }
}

/// Main error type for Chatkeep operations
///
/// Every failure surfaced by the store, the template engine and the export
/// coordinator maps onto one of these variants so callers can decide whether
/// to skip, retry or abort.
#[derive(Error, Debug)]
pub enum ChatkeepError {
    /// Unknown conversation or template identifier
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity that was looked up
        kind: EntityKind,
        /// Identifier (or prefix) that did not resolve
        id: String,
    },

    /// Invalid input or a structurally malformed stored document
    #[error("Validation error: {0}")]
    Validation(String),

    /// Template instantiation was missing referenced variables
    #[error("Missing template variables: {}", .variables.join(", "))]
    MissingVariable {
        /// Every referenced variable that had no value, sorted
        variables: Vec<String>,
    },

    /// Durable storage failure with operation context
    #[error("IO error: {context}: {source}")]
    Io {
        /// Operation and identifier that failed
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The persisted search index could not be read
    ///
    /// Handled internally by rebuilding the index; it only escapes when the
    /// caller reads the index file directly.
    #[error("Search index corrupted: {0}")]
    IndexCorruption(String),

    /// No renderer registered under the requested name
    #[error("Unsupported export format '{format}'. Available: {}", .available.join(", "))]
    UnsupportedFormat {
        /// Requested format name
        format: String,
        /// Registered format names
        available: Vec<String>,
    },

    /// A cancellable operation observed its cancellation signal
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ChatkeepError {
    /// Build an `Io` error tagged with the operation that failed
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ChatkeepError::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for a missing conversation
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        ChatkeepError::NotFound {
            kind: EntityKind::Conversation,
            id: id.into(),
        }
    }

    /// Shorthand for a missing template
    pub fn template_not_found(id: impl Into<String>) -> Self {
        ChatkeepError::NotFound {
            kind: EntityKind::Template,
            id: id.into(),
        }
    }
}

/// Result type alias for Chatkeep operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need the error kind use `downcast_ref::<ChatkeepError>()`.
pub type Result<T> = anyhow::Result<T>;

/// Look up the `ChatkeepError` behind an `anyhow::Error`, if any
pub fn kind_of(error: &anyhow::Error) -> Option<&ChatkeepError> {
    error.downcast_ref::<ChatkeepError>()
}
