//! Print-ready HTML export
//!
//! The document is self-contained (inline CSS, no external assets) and uses
//! `@page` rules so a browser's "print to PDF" produces paginated output.
//! Messages are grouped into page sections of `messages_per_page`, and the
//! cancellation signal is checked between sections.

use std::fmt::Write as _;

use super::code::{classify, Body};
use super::{ExportOptions, RenderContext, Renderer};
use crate::error::Result;
use crate::storage::{Conversation, Message};

/// Self-contained printable HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn name(&self) -> &'static str {
        "html"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["printable", "pdf"]
    }

    fn extension(&self) -> &'static str {
        "html"
    }

    fn mime_type(&self) -> &'static str {
        "text/html"
    }

    fn description(&self) -> &'static str {
        "Print-ready HTML with page layout, for saving as PDF"
    }

    fn render(&self, conversation: &Conversation, ctx: &RenderContext<'_>) -> Result<String> {
        let options = ctx.options;
        let title = escape(conversation.title());
        let mut out = String::new();

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html>")?;
        writeln!(out, "<head>")?;
        writeln!(out, "<meta charset=\"utf-8\">")?;
        writeln!(out, "<title>{}</title>", title)?;
        writeln!(out, "<style>{}</style>", stylesheet(options))?;
        writeln!(out, "</head>")?;
        writeln!(out, "<body>")?;
        writeln!(out, "<h1>{}</h1>", title)?;

        if options.include_metadata {
            metadata_table(&mut out, conversation, options)?;
        }

        writeln!(out, "<div class=\"messages\">")?;
        writeln!(out, "<h2>Conversation Messages</h2>")?;
        let per_page = options.messages_per_page.max(1);
        for (page, chunk) in conversation.messages().chunks(per_page).enumerate() {
            ctx.check_cancelled()?;
            writeln!(out, "<section class=\"page\" id=\"page-{}\">", page + 1)?;
            for (offset, message) in chunk.iter().enumerate() {
                message_div(&mut out, page * per_page + offset + 1, message, options)?;
            }
            writeln!(out, "</section>")?;
        }
        writeln!(out, "</div>")?;
        writeln!(out, "</body>")?;
        writeln!(out, "</html>")?;

        Ok(out)
    }
}

/// Escape text for HTML element and attribute content
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn css_string(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | ','))
        .collect()
}

fn metadata_table(
    out: &mut String,
    conversation: &Conversation,
    options: &ExportOptions,
) -> Result<()> {
    let fmt = options.timestamp_format.as_str();
    writeln!(out, "<div class=\"metadata\">")?;
    writeln!(out, "<h2>Conversation Metadata</h2>")?;
    writeln!(out, "<table>")?;
    writeln!(out, "<tr><td>ID</td><td>{}</td></tr>", escape(conversation.id()))?;
    writeln!(out, "<tr><td>Model</td><td>{}</td></tr>", escape(conversation.model()))?;
    writeln!(
        out,
        "<tr><td>Messages</td><td>{}</td></tr>",
        conversation.messages().len()
    )?;
    if options.include_timestamps {
        writeln!(
            out,
            "<tr><td>Created</td><td>{}</td></tr>",
            conversation.created_at().format(fmt)
        )?;
        writeln!(
            out,
            "<tr><td>Updated</td><td>{}</td></tr>",
            conversation.updated_at().format(fmt)
        )?;
    }
    writeln!(out, "</table>")?;
    writeln!(out, "</div>")?;
    Ok(())
}

fn message_div(
    out: &mut String,
    index: usize,
    message: &Message,
    options: &ExportOptions,
) -> Result<()> {
    let role = message.role();
    writeln!(out, "<div class=\"message message-{}\">", role.as_str())?;
    writeln!(out, "<h3>Message {}: {}</h3>", index, role.label())?;
    if options.include_timestamps {
        writeln!(
            out,
            "<p class=\"timestamp\">{}</p>",
            message.timestamp().format(&options.timestamp_format)
        )?;
    }
    match classify(message, options.detect_code) {
        Body::Code { language, code } => {
            writeln!(
                out,
                "<pre class=\"code\" data-language=\"{}\"><code>{}</code></pre>",
                escape(&language),
                escape(code)
            )?;
        }
        Body::Prose(text) => {
            writeln!(
                out,
                "<div class=\"content\">{}</div>",
                escape(text).replace('\n', "<br>\n")
            )?;
        }
    }
    writeln!(out, "</div>")?;
    Ok(())
}

fn stylesheet(options: &ExportOptions) -> String {
    let size = options.font_size;
    format!(
        r#"
@page {{ size: {page}; margin: {margin}; }}
body {{ font-family: "{font}", sans-serif; font-size: {size}pt; line-height: 1.6; color: #333; }}
h1 {{ font-size: {title}pt; color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; }}
h2 {{ font-size: {header}pt; color: #34495e; margin-top: 30px; }}
h3 {{ font-size: {h3}pt; color: #7f8c8d; margin-bottom: 5px; }}
.metadata table {{ width: 100%; border-collapse: collapse; margin-bottom: 20px; }}
.metadata td {{ padding: 8px; border: 1px solid #ddd; }}
.metadata td:first-child {{ background-color: #f8f9fa; font-weight: bold; width: 150px; }}
.page + .page {{ break-before: page; }}
.message {{ margin-bottom: 25px; padding: 15px; border-left: 4px solid #3498db; background-color: #f8f9fa; break-inside: avoid; }}
.message-user {{ border-left-color: #e74c3c; }}
.message-assistant {{ border-left-color: #27ae60; }}
.message-system {{ border-left-color: #f39c12; }}
.timestamp {{ font-style: italic; font-size: {small}pt; color: #7f8c8d; margin-bottom: 10px; }}
.code {{ background-color: #2c3e50; color: #ecf0f1; padding: 15px; border-radius: 5px; font-family: "Courier New", monospace; font-size: {code}pt; white-space: pre-wrap; }}
"#,
        page = options.page_size.as_css(),
        margin = css_string(&options.margin),
        font = css_string(&options.font_family),
        size = size,
        title = size + 6,
        header = size + 2,
        h3 = size + 2,
        small = size.saturating_sub(2),
        code = size.saturating_sub(1),
    )
}
