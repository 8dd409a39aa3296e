//! Plain text transcript

use std::fmt::Write as _;

use super::code::{classify, fence_for, Body};
use super::{RenderContext, Renderer};
use crate::error::Result;
use crate::storage::Conversation;

const RULE_WIDTH: usize = 50;
const MESSAGE_RULE_WIDTH: usize = 30;

/// Plain UTF-8 transcript
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["txt", "plain"]
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn mime_type(&self) -> &'static str {
        "text/plain"
    }

    fn description(&self) -> &'static str {
        "Plain text transcript"
    }

    fn render(&self, conversation: &Conversation, ctx: &RenderContext<'_>) -> Result<String> {
        let options = ctx.options;
        let fmt = options.timestamp_format.as_str();
        let mut out = String::new();

        writeln!(out, "Title: {}\n", conversation.title())?;

        if options.include_metadata {
            writeln!(out, "Metadata:")?;
            writeln!(out, "  ID: {}", conversation.id())?;
            writeln!(out, "  Model: {}", conversation.model())?;
            writeln!(out, "  Messages: {}", conversation.messages().len())?;
            if options.include_timestamps {
                writeln!(out, "  Created: {}", conversation.created_at().format(fmt))?;
                writeln!(out, "  Updated: {}", conversation.updated_at().format(fmt))?;
            }
            writeln!(out)?;
        }

        writeln!(out, "Messages:")?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

        for (i, message) in conversation.messages().iter().enumerate() {
            ctx.check_cancelled()?;
            writeln!(out, "\nMessage {}: {}", i + 1, message.role().label())?;
            if options.include_timestamps {
                writeln!(out, "Time: {}", message.timestamp().format(fmt))?;
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
            writeln!(out, "{}", "-".repeat(MESSAGE_RULE_WIDTH))?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOptions;
    use crate::storage::{Metadata, LANGUAGE_KEY};
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    fn render(c: &Conversation, options: &ExportOptions) -> String {
        let cancel = CancellationToken::new();
        TextRenderer
            .render(
                c,
                &RenderContext {
                    options,
                    cancel: &cancel,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_text_transcript_layout() {
        let mut c = Conversation::new("c-1", "Plain", "ai/gemma3");
        c.append_message("user", "ping", Metadata::new()).unwrap();
        c.append_message("assistant", "pong", Metadata::new())
            .unwrap();

        let out = render(&c, &ExportOptions::preset("clean").unwrap());

        assert!(out.starts_with("Title: Plain\n"));
        assert!(!out.contains("Metadata:"));
        let ping = out.find("Message 1: User\n\nping").unwrap();
        let pong = out.find("Message 2: Assistant\n\npong").unwrap();
        assert!(ping < pong);
    }

    #[test]
    fn test_language_hint_fences_message() {
        let mut meta = Metadata::new();
        meta.insert(LANGUAGE_KEY.to_string(), Value::from("rust"));
        let mut c = Conversation::new("c-1", "Snippet", "ai/gemma3");
        c.append_message("assistant", "let x = 1;", meta).unwrap();
        c.append_message("user", "thanks", Metadata::new()).unwrap();

        let options = ExportOptions {
            detect_code: false,
            ..Default::default()
        };
        let out = render(&c, &options);

        assert!(out.contains("```rust\nlet x = 1;\n```\n"), "{}", out);
        assert!(out.contains("\nthanks\n"));
        assert!(!out.contains("```\nthanks"));
    }
}
