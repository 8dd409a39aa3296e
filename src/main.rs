//! Chatkeep - conversation storage CLI
//!
#![doc = "Main entry point for the Chatkeep command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatkeep::cli::{Cli, Commands};
use chatkeep::commands;
use chatkeep::config::Config;

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);
    chatkeep::metrics::init_metrics_exporter();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::New { title, model } => {
            commands::conversations::new_conversation(&config, &title, model.as_deref())
        }
        Commands::Append {
            id,
            role,
            content,
            language,
        } => commands::conversations::append(&config, &id, &role, &content, language.as_deref()),
        Commands::Show {
            id,
            role,
            chat_json,
        } => commands::conversations::show(&config, &id, role.as_deref(), chat_json),
        Commands::List => commands::conversations::list(&config),
        Commands::Search { query } => commands::conversations::search(&config, &query),
        Commands::Delete { id } => commands::conversations::delete(&config, &id),
        Commands::Import { path, check } => {
            if check {
                commands::conversations::check_import(&path)
            } else {
                commands::conversations::import(&config, &path)
            }
        }
        Commands::Index { command } => commands::conversations::index(&config, command),
        Commands::Templates { command } => {
            tracing::debug!("Running template command: {:?}", command);
            commands::templates::handle_templates(&config, command)
        }
        Commands::Export {
            ids,
            format,
            output,
            preset,
            collection,
        } => {
            tracing::info!("Exporting {} conversations", ids.len());
            if collection {
                commands::export::export_collection(&config, &ids, output)
            } else {
                commands::export::export(&config, &ids, &format, output, preset.as_deref())
            }
        }
        Commands::Formats => commands::export::formats(),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "chatkeep=debug" } else { "chatkeep=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
