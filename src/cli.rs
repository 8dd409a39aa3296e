//! Command-line interface definition for Chatkeep
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for conversations, templates, the search index and
//! exports.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chatkeep - conversation storage, templates and export
///
/// Store model conversations as plain JSON files, search them, seed new
/// ones from templates and export them as Markdown, HTML, JSON or text.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatkeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Chatkeep
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create an empty conversation
    New {
        /// Conversation title
        title: String,

        /// Model name (defaults to models.default)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Append a message to a stored conversation
    Append {
        /// Conversation id or unique prefix
        id: String,

        /// Message role (system, user, assistant)
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Message content
        content: String,

        /// Code language hint for the message
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Print a conversation
    Show {
        /// Conversation id or unique prefix
        id: String,

        /// Only show messages from this role
        #[arg(short, long)]
        role: Option<String>,

        /// Print the messages as a JSON array of {role, content} objects
        #[arg(long)]
        chat_json: bool,
    },

    /// List stored conversations
    List,

    /// Search conversations (all words must match)
    Search {
        /// Search words
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id or unique prefix
        id: String,
    },

    /// Import a structured (JSON) export or collection
    Import {
        /// Path to the exported file
        path: PathBuf,

        /// Only check the file and report what an import would do
        #[arg(long)]
        check: bool,
    },

    /// Maintain the search index
    Index {
        /// Index subcommand
        #[command(subcommand)]
        command: IndexCommand,
    },

    /// Manage conversation templates
    Templates {
        /// Template subcommand
        #[command(subcommand)]
        command: TemplateCommand,
    },

    /// Export conversations
    Export {
        /// Conversation ids or unique prefixes
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,

        /// Output format (json, markdown, html, text or an alias);
        /// repeat to export a bundle in several formats
        #[arg(short, long)]
        format: Vec<String>,

        /// Output directory (defaults to export.output_dir), or the
        /// collection file with --collection
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Option preset (default, clean, detailed, presentation)
        #[arg(short, long)]
        preset: Option<String>,

        /// Write all conversations into one JSON collection file
        #[arg(long, conflicts_with_all = ["format", "preset"])]
        collection: bool,
    },

    /// List the available export formats
    Formats,
}

/// Search index subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum IndexCommand {
    /// Rebuild the index from the stored conversations
    Rebuild,

    /// Show index statistics
    Stats,
}

/// Template subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum TemplateCommand {
    /// List templates
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show a template
    Show {
        /// Template id or name
        id: String,
    },

    /// Search templates by name, description or tag
    Search {
        /// Text to look for
        query: String,
    },

    /// Create a conversation from a template
    Instantiate {
        /// Template id or name
        id: String,

        /// Variable value as NAME=VALUE (repeatable)
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Conversation title
        #[arg(short, long)]
        title: Option<String>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// max_tokens override
        #[arg(long)]
        max_tokens: Option<u32>,

        /// temperature override
        #[arg(long)]
        temperature: Option<f64>,

        /// top_p override
        #[arg(long)]
        top_p: Option<f64>,
    },

    /// Delete a template
    Delete {
        /// Template id
        id: String,
    },

    /// Install the built-in templates
    Install,

    /// List template categories
    Categories,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
