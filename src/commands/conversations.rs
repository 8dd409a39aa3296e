use std::path::Path;

use colored::Colorize;
use prettytable::{format, Table};
use serde_json::Value;

use super::{open_store, short_id, truncate};
use crate::cli::IndexCommand;
use crate::config::Config;
use crate::error::{ChatkeepError, Result};
use crate::export::validate_import_file;
use crate::storage::{ConversationSummary, ImportOutcome, Metadata, Role, LANGUAGE_KEY};

/// Create an empty conversation and print its id
pub fn new_conversation(config: &Config, title: &str, model: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let model = model.unwrap_or(&config.models.default);
    let conversation = store.create(title, model)?;
    store.save(&conversation)?;

    println!(
        "{} {}",
        "Created conversation".green(),
        conversation.id().cyan()
    );
    Ok(())
}

/// Append one message to a stored conversation
pub fn append(
    config: &Config,
    id: &str,
    role: &str,
    content: &str,
    language: Option<&str>,
) -> Result<()> {
    let store = open_store(config)?;
    let id = store.resolve(id)?;
    let conversation = store.load(&id)?;

    let mut metadata = Metadata::new();
    if let Some(language) = language {
        metadata.insert(LANGUAGE_KEY.to_string(), Value::from(language));
    }
    let conversation = store.append_message(conversation, role, content, metadata)?;
    store.save(&conversation)?;

    println!(
        "{}",
        format!(
            "Appended message {} to {}",
            conversation.messages().len(),
            short_id(&id)
        )
        .green()
    );
    Ok(())
}

/// Print a conversation with its messages
pub fn show(config: &Config, id: &str, role: Option<&str>, chat_json: bool) -> Result<()> {
    let store = open_store(config)?;
    let conversation = store.load(&store.resolve(id)?)?;
    let role = role.map(|r| r.parse::<Role>()).transpose()?;

    if chat_json {
        let messages: Vec<Value> = match role {
            Some(role) => conversation
                .chat_messages()
                .into_iter()
                .filter(|m| m["role"] == role.as_str())
                .collect(),
            None => conversation.chat_messages(),
        };
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    println!("\n{}", conversation.title().bold());
    println!("{} {}", "ID:".dimmed(), conversation.id());
    println!("{} {}", "Model:".dimmed(), conversation.model());
    println!(
        "{} {}",
        "Updated:".dimmed(),
        conversation.updated_at().format("%Y-%m-%d %H:%M")
    );

    let messages: Vec<_> = match role {
        Some(role) => conversation.messages_with_role(role).collect(),
        None => conversation.messages().iter().collect(),
    };
    for message in messages {
        let label = match message.role() {
            Role::System => message.role().label().yellow(),
            Role::User => message.role().label().cyan(),
            Role::Assistant => message.role().label().green(),
        };
        println!(
            "\n{} {}",
            label.bold(),
            message.timestamp().format("%H:%M:%S").to_string().dimmed()
        );
        println!("{}", message.content());
    }
    println!();
    Ok(())
}

fn print_summaries(heading: &str, summaries: Vec<ConversationSummary>) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Model".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for summary in summaries {
        let updated = summary.updated_at.format("%Y-%m-%d %H:%M").to_string();
        table.add_row(prettytable::row![
            short_id(&summary.id).cyan(),
            truncate(&summary.title, 40),
            summary.model,
            summary.message_count,
            updated
        ]);
    }

    println!("\n{}", heading);
    table.printstd();
    println!();
}

/// List stored conversations, most recently updated first
pub fn list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let summaries = store.list()?;

    if summaries.is_empty() {
        println!("{}", "No conversations found.".yellow());
        return Ok(());
    }

    print_summaries("Conversations:", summaries);
    println!(
        "Use {} to read one.",
        "chatkeep show <ID>".cyan()
    );
    println!();
    Ok(())
}

/// Search conversations for all of the given words
pub fn search(config: &Config, words: &[String]) -> Result<()> {
    let store = open_store(config)?;
    let query = words.join(" ");
    let summaries = store.search_summaries(&query)?;

    if summaries.is_empty() {
        println!("{}", format!("No conversations match '{}'.", query).yellow());
        return Ok(());
    }

    print_summaries(&format!("Conversations matching '{}':", query), summaries);
    Ok(())
}

/// Delete a conversation
pub fn delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let id = store.resolve(id)?;
    store.delete(&id)?;
    println!("{}", format!("Deleted conversation {}", id).green());
    Ok(())
}

/// Import a structured export
pub fn import(config: &Config, path: &Path) -> Result<()> {
    let store = open_store(config)?;
    let items = store.import_many(path)?;

    let mut imported = 0;
    for item in &items {
        match &item.outcome {
            ImportOutcome::Imported => {
                imported += 1;
                println!(
                    "{} {} ({})",
                    "Imported conversation".green(),
                    item.id.cyan(),
                    item.title
                );
            }
            ImportOutcome::Failed(reason) => {
                println!("{} {}: {}", "skipped".yellow(), item.id, reason);
            }
        }
    }

    if imported == 0 {
        return Err(ChatkeepError::Validation(format!(
            "nothing imported from {}",
            path.display()
        ))
        .into());
    }
    Ok(())
}

/// Report whether a file can be imported, without storing anything
pub fn check_import(path: &Path) -> Result<()> {
    let check = validate_import_file(path);

    if let Some(kind) = check.kind {
        println!("{} {:?}", "Format:".bold(), kind);
    }
    println!("{} {}", "Conversations:".bold(), check.conversation_count);
    for title in &check.titles {
        println!("  {}", title);
    }
    for warning in &check.warnings {
        println!("{} {}", "warning".yellow(), warning);
    }
    for error in &check.errors {
        println!("{} {}", "error".red(), error);
    }

    if !check.is_valid() {
        return Err(ChatkeepError::Validation(format!(
            "{} cannot be imported ({} errors)",
            path.display(),
            check.errors.len()
        ))
        .into());
    }
    println!("{}", "Ready to import".green());
    Ok(())
}

/// Rebuild or inspect the search index
pub fn index(config: &Config, command: IndexCommand) -> Result<()> {
    let store = open_store(config)?;
    match command {
        IndexCommand::Rebuild => {
            let report = store.rebuild_index()?;
            println!(
                "{}",
                format!("Indexed {} conversations", report.indexed).green()
            );
            for skipped in &report.skipped {
                println!(
                    "  {} {}: {}",
                    "skipped".yellow(),
                    skipped.id,
                    skipped.reason
                );
            }
        }
        IndexCommand::Stats => {
            let stats = store.index_stats();
            println!("{} {}", "Conversations:".bold(), stats.conversations);
            println!("{} {}", "Tokens:".bold(), stats.tokens);
            if stats.skipped > 0 {
                println!("{} {}", "Unreadable records:".bold().yellow(), stats.skipped);
            }
            match &stats.path {
                Some(path) => println!(
                    "{} {}{}",
                    "Index file:".bold(),
                    path.display(),
                    if stats.file_exists { "" } else { " (not written yet)" }
                ),
                None => println!("{} in memory", "Index file:".bold()),
            }
        }
    }
    Ok(())
}
