//! Markdown export

use std::fmt::Write as _;

use serde_json::Value;

use super::code::{classify, fence_for, Body};
use super::{RenderContext, Renderer};
use crate::error::Result;
use crate::storage::{Conversation, Message, LANGUAGE_KEY};
use crate::templates::MODEL_CONFIG_KEY;

/// GitHub-flavored Markdown
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["md"]
    }

    fn extension(&self) -> &'static str {
        "md"
    }

    fn mime_type(&self) -> &'static str {
        "text/markdown"
    }

    fn description(&self) -> &'static str {
        "Readable document with metadata table and fenced code"
    }

    fn render(&self, conversation: &Conversation, ctx: &RenderContext<'_>) -> Result<String> {
        let options = ctx.options;
        let mut out = String::new();

        writeln!(out, "# {}\n", single_line(conversation.title()))?;

        if options.include_metadata {
            metadata_section(&mut out, conversation, ctx)?;
        }
        if options.include_toc {
            toc_section(&mut out, conversation, options.include_metadata)?;
        }

        writeln!(out, "## Conversation Messages\n")?;
        let total = conversation.messages().len();
        for (i, message) in conversation.messages().iter().enumerate() {
            ctx.check_cancelled()?;
            message_block(&mut out, i + 1, message, ctx)?;
            if i + 1 < total {
                writeln!(out, "\n---\n")?;
            }
        }

        Ok(out)
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn table_cell(text: &str) -> String {
    single_line(text).replace('|', "\\|")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn metadata_section(
    out: &mut String,
    conversation: &Conversation,
    ctx: &RenderContext<'_>,
) -> Result<()> {
    let options = ctx.options;
    writeln!(out, "## Conversation Metadata\n")?;
    writeln!(out, "| Field | Value |")?;
    writeln!(out, "|-------|-------|")?;
    writeln!(out, "| **ID** | `{}` |", conversation.id())?;
    writeln!(out, "| **Title** | {} |", table_cell(conversation.title()))?;
    writeln!(out, "| **Model** | `{}` |", conversation.model())?;
    if options.include_timestamps {
        let fmt = options.timestamp_format.as_str();
        writeln!(out, "| **Created** | {} |", conversation.created_at().format(fmt))?;
        writeln!(out, "| **Updated** | {} |", conversation.updated_at().format(fmt))?;
    }
    writeln!(out, "| **Messages** | {} |", conversation.messages().len())?;
    for (key, value) in conversation.metadata() {
        if key == MODEL_CONFIG_KEY {
            continue;
        }
        writeln!(
            out,
            "| **{}** | {} |",
            table_cell(key),
            table_cell(&display_value(value))
        )?;
    }
    writeln!(out)?;

    if let Some(Value::Object(config)) = conversation.metadata().get(MODEL_CONFIG_KEY) {
        if !config.is_empty() {
            writeln!(out, "### Model Configuration\n")?;
            for (key, value) in config {
                writeln!(out, "- **{}**: `{}`", key, display_value(value))?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

fn anchor(index: usize, message: &Message) -> String {
    format!("message-{}-{}", index, message.role().as_str())
}

fn toc_section(out: &mut String, conversation: &Conversation, with_metadata: bool) -> Result<()> {
    writeln!(out, "## Table of Contents\n")?;
    if with_metadata {
        writeln!(out, "- [Conversation Metadata](#conversation-metadata)")?;
    }
    for (i, message) in conversation.messages().iter().enumerate() {
        let preview: String = single_line(message.content()).chars().take(30).collect();
        let ellipsis = if message.content().chars().count() > 30 {
            "..."
        } else {
            ""
        };
        writeln!(
            out,
            "- [Message {}: {} - {}{}](#{})",
            i + 1,
            message.role().label(),
            preview.replace(&['[', ']'][..], ""),
            ellipsis,
            anchor(i + 1, message)
        )?;
    }
    writeln!(out)?;
    Ok(())
}

fn message_block(
    out: &mut String,
    index: usize,
    message: &Message,
    ctx: &RenderContext<'_>,
) -> Result<()> {
    let options = ctx.options;
    if options.include_toc {
        writeln!(out, "<a id=\"{}\"></a>", anchor(index, message))?;
    }
    if options.include_message_numbers {
        writeln!(out, "### Message {}: {}", index, message.role().label())?;
    } else {
        writeln!(out, "### {}", message.role().label())?;
    }
    if options.include_timestamps {
        writeln!(
            out,
            "*{}*",
            message.timestamp().format(&options.timestamp_format)
        )?;
    }
    writeln!(out)?;

    match classify(message, options.detect_code) {
        Body::Code { language, code } => {
            let fence = fence_for(code);
            writeln!(out, "{}{}", fence, language)?;
            writeln!(out, "{}", code.trim_end_matches('\n'))?;
            writeln!(out, "{}", fence)?;
        }
        Body::Prose(text) => writeln!(out, "{}", text)?,
    }

    if options.include_message_metadata {
        let extra: Vec<_> = message
            .metadata()
            .iter()
            .filter(|(k, _)| k.as_str() != LANGUAGE_KEY)
            .collect();
        if !extra.is_empty() {
            writeln!(out, "\n**Message Metadata:**")?;
            for (key, value) in extra {
                writeln!(out, "- **{}**: `{}`", key, display_value(value))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOptions;
    use crate::storage::Metadata;
    use tokio_util::sync::CancellationToken;

    fn render_with(conversation: &Conversation, options: ExportOptions) -> String {
        let cancel = CancellationToken::new();
        MarkdownRenderer
            .render(
                conversation,
                &RenderContext {
                    options: &options,
                    cancel: &cancel,
                },
            )
            .unwrap()
    }

    fn sample() -> Conversation {
        let mut c = Conversation::new("c-1", "Rust | help", "ai/gemma3");
        c.append_message("user", "How do I print?", Metadata::new())
            .unwrap();
        let mut meta = Metadata::new();
        meta.insert(LANGUAGE_KEY.to_string(), Value::from("rust"));
        c.append_message("assistant", "println!(\"hi\");", meta)
            .unwrap();
        c
    }

    #[test]
    fn test_messages_in_order_with_role_labels() {
        let out = render_with(&sample(), ExportOptions::default());
        let user = out.find("### User").unwrap();
        let assistant = out.find("### Assistant").unwrap();
        assert!(user < assistant);
        assert!(out.starts_with("# Rust | help\n"));
    }

    #[test]
    fn test_language_hint_fences_code() {
        let out = render_with(&sample(), ExportOptions::default());
        assert!(out.contains("```rust\nprintln!(\"hi\");\n```"));
    }

    #[test]
    fn test_metadata_table_escapes_pipes() {
        let out = render_with(&sample(), ExportOptions::default());
        assert!(out.contains("## Conversation Metadata"));
        assert!(out.contains("| **Title** | Rust \\| help |"));
        assert!(out.contains("| **Messages** | 2 |"));
    }

    #[test]
    fn test_clean_preset_omits_metadata_and_timestamps() {
        let out = render_with(&sample(), ExportOptions::preset("clean").unwrap());
        assert!(!out.contains("Conversation Metadata"));
        assert!(!out.contains("| **Created**"));
        assert!(!out.contains("*20"));
    }

    #[test]
    fn test_detailed_preset_adds_toc_and_numbers() {
        let out = render_with(&sample(), ExportOptions::preset("detailed").unwrap());
        assert!(out.contains("## Table of Contents"));
        assert!(out.contains("(#message-2-assistant)"));
        assert!(out.contains("### Message 1: User"));
    }

    #[test]
    fn test_model_config_listed_separately() {
        let mut c = sample();
        c.insert_metadata(MODEL_CONFIG_KEY, serde_json::json!({"max_tokens": 500}));
        let out = render_with(&c, ExportOptions::default());
        assert!(out.contains("### Model Configuration"));
        assert!(out.contains("- **max_tokens**: `500`"));
    }

    #[test]
    fn test_cancelled_render_fails() {
        let options = ExportOptions::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = MarkdownRenderer
            .render(
                &sample(),
                &RenderContext {
                    options: &options,
                    cancel: &cancel,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::ChatkeepError>(),
            Some(crate::error::ChatkeepError::Cancelled)
        ));
    }
}
