use std::collections::HashMap;

use colored::Colorize;
use prettytable::{format, Table};

use super::{open_store, open_templates, truncate};
use crate::cli::TemplateCommand;
use crate::config::{Config, ModelConfig};
use crate::error::{ChatkeepError, Result};
use crate::templates::{InstantiateRequest, Template};

/// Handle template commands
pub fn handle_templates(config: &Config, command: TemplateCommand) -> Result<()> {
    let manager = open_templates(config)?;

    match command {
        TemplateCommand::List { category } => {
            let mut templates = manager.list()?;
            if let Some(category) = &category {
                templates.retain(|t| t.category.eq_ignore_ascii_case(category));
            }
            print_templates("Templates:", templates);
        }
        TemplateCommand::Show { id } => {
            let template = manager.find(&id)?;
            print_template(&template);
        }
        TemplateCommand::Search { query } => {
            let templates = manager.search(&query)?;
            print_templates(&format!("Templates matching '{}':", query), templates);
        }
        TemplateCommand::Instantiate {
            id,
            vars,
            title,
            model,
            max_tokens,
            temperature,
            top_p,
        } => {
            let template = manager.find(&id)?;
            let request = InstantiateRequest {
                values: parse_vars(&vars)?,
                overrides: ModelConfig {
                    max_tokens,
                    temperature,
                    top_p,
                    ..Default::default()
                },
                title,
                model,
            };
            let store = open_store(config)?;
            let conversation = manager.instantiate(&template.id, &request, &store, config)?;
            println!(
                "{} {} {} {}",
                "Created conversation".green(),
                conversation.id().cyan(),
                "from template".green(),
                template.name
            );
        }
        TemplateCommand::Delete { id } => {
            if manager.delete(&id)? {
                println!("{}", format!("Deleted template {}", id).green());
            } else {
                println!("{}", format!("Template {} does not exist", id).yellow());
            }
        }
        TemplateCommand::Install => {
            let installed = manager.install_builtin()?;
            println!(
                "{}",
                format!("Installed {} built-in templates", installed).green()
            );
        }
        TemplateCommand::Categories => {
            for category in manager.categories()? {
                println!("{}", category);
            }
        }
    }

    Ok(())
}

/// Parse repeated `NAME=VALUE` arguments
///
/// Values may contain `=`; only the first one separates the name.
pub fn parse_vars(vars: &[String]) -> Result<HashMap<String, String>> {
    let mut values = HashMap::with_capacity(vars.len());
    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            return Err(ChatkeepError::Validation(format!(
                "variable '{}' must be written as NAME=VALUE",
                var
            ))
            .into());
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(
                ChatkeepError::Validation(format!("variable '{}' has no name", var)).into(),
            );
        }
        values.insert(name.to_string(), value.to_string());
    }
    Ok(values)
}

fn print_templates(heading: &str, templates: Vec<Template>) {
    if templates.is_empty() {
        println!("{}", "No templates found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Name".bold(),
        "Category".bold(),
        "Variables".bold(),
        "Description".bold()
    ]);

    for template in templates {
        table.add_row(prettytable::row![
            template.id.cyan(),
            template.name,
            template.category,
            template.variables.join(", "),
            truncate(&template.description, 50)
        ]);
    }

    println!("\n{}", heading);
    table.printstd();
    println!();
}

fn print_template(template: &Template) {
    println!("\n{} ({})", template.name.bold(), template.id.cyan());
    if !template.description.is_empty() {
        println!("{}", template.description);
    }
    println!("{} {}", "Category:".dimmed(), template.category);
    if !template.tags.is_empty() {
        println!("{} {}", "Tags:".dimmed(), template.tags.join(", "));
    }
    println!("{} {}", "Variables:".dimmed(), template.variables.join(", "));
    println!("{} {}", "Default model:".dimmed(), template.default_model);

    for message in &template.messages {
        println!("\n{}", message.role.label().bold());
        println!("{}", message.content_template);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vars_splits_on_first_equals() {
        let vars = vec!["code=a == b".to_string(), " language =rust".to_string()];
        let values = parse_vars(&vars).unwrap();
        assert_eq!(values["code"], "a == b");
        assert_eq!(values["language"], "rust");
    }

    #[test]
    fn test_parse_vars_rejects_missing_separator() {
        let err = parse_vars(&["language".to_string()]).unwrap_err();
        assert!(err.to_string().contains("NAME=VALUE"));
    }

    #[test]
    fn test_parse_vars_rejects_empty_name() {
        assert!(parse_vars(&["=rust".to_string()]).is_err());
    }
}
