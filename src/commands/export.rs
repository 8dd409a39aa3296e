use std::path::PathBuf;

use colored::Colorize;
use prettytable::{format, Table};
use tokio_util::sync::CancellationToken;

use super::open_store;
use crate::config::Config;
use crate::error::{ChatkeepError, Result};
use crate::export::{ExportItem, ExportOptions, ExportOutcome, Exporter};
use crate::storage::ConversationStore;

/// Export one or more conversations into a directory
///
/// Ids may be unique prefixes. An id that does not resolve is passed through
/// unchanged and reported as failed alongside the others. With several
/// formats every conversation is exported once per format.
pub fn export(
    config: &Config,
    ids: &[String],
    formats: &[String],
    output: Option<PathBuf>,
    preset: Option<&str>,
) -> Result<()> {
    let store = open_store(config)?;
    let exporter = Exporter::new();

    let formats = if formats.is_empty() {
        vec![config.export.default_format.clone()]
    } else {
        formats.to_vec()
    };
    let dir = output.unwrap_or_else(|| config.export.output_dir.clone());
    let options = match preset {
        Some(name) => ExportOptions::preset(name)?,
        None => config.export.options.clone(),
    };

    let resolved = resolve_all(&store, ids);
    let cancel = CancellationToken::new();
    let reports = exporter.export_bundle(&store, &resolved, &formats, &dir, &options, &cancel)?;

    let bundle = reports.len() > 1;
    let mut items = Vec::new();
    for report in reports {
        if bundle {
            println!("{}", report.format.bold());
        }
        items.extend(report.items);
    }
    print_outcomes(&items)
}

/// Export conversations into a single structured collection file
///
/// `output` is the file to write, or a directory to place it in (defaults
/// to export.output_dir).
pub fn export_collection(config: &Config, ids: &[String], output: Option<PathBuf>) -> Result<()> {
    let store = open_store(config)?;
    let destination = output.unwrap_or_else(|| config.export.output_dir.clone());
    if destination.extension().is_none() {
        std::fs::create_dir_all(&destination).map_err(|e| {
            ChatkeepError::io(format!("create export directory {}", destination.display()), e)
        })?;
    }

    let resolved = resolve_all(&store, ids);
    let items = crate::export::export_collection(
        &store,
        &resolved,
        &destination,
        &CancellationToken::new(),
    )?;
    print_outcomes(&items)
}

fn resolve_all(store: &ConversationStore, ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| match store.resolve(id) {
            Ok(full) => full,
            Err(e) => {
                tracing::debug!("Could not resolve '{}': {:#}", id, e);
                id.clone()
            }
        })
        .collect()
}

fn print_outcomes(items: &[ExportItem]) -> Result<()> {
    let mut failed = 0;
    for item in items {
        match &item.outcome {
            ExportOutcome::Exported(path) => {
                println!("{} {}", "exported".green(), path.display());
            }
            ExportOutcome::Failed(reason) => {
                failed += 1;
                println!("{} {}: {}", "failed".red(), item.id, reason);
            }
            ExportOutcome::Cancelled => {
                println!("{} {}", "cancelled".yellow(), item.id);
            }
        }
    }

    if failed == items.len() && !items.is_empty() {
        return Err(ChatkeepError::Validation(format!(
            "none of the {} conversations could be exported",
            items.len()
        ))
        .into());
    }
    Ok(())
}

/// Print the registered export formats
pub fn formats() -> Result<()> {
    let exporter = Exporter::new();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Format".bold(),
        "Aliases".bold(),
        "Extension".bold(),
        "Description".bold()
    ]);

    for info in exporter.formats() {
        table.add_row(prettytable::row![
            info.name.cyan(),
            info.aliases.join(", "),
            info.extension,
            info.description
        ]);
    }

    println!("\nExport formats:");
    table.printstd();
    println!();
    Ok(())
}
