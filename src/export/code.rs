//! Code block detection for presentation renderers

use crate::storage::Message;

const LINE_STARTS: &[&str] = &[
    "#!", "def ", "class ", "import ", "from ", "fn ", "pub fn ", "impl ", "use ", "function ",
    "const ", "let ", "var ", "#include", "package ", "select ", "insert ", "<html", "<div",
    "<!doctype",
];

const SYMBOLS: &str = "{}[]();,=<>!@#$%^&*";

/// How a message body should be presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body<'a> {
    /// Ordinary prose
    Prose(&'a str),
    /// A code block, with a language tag when known
    Code {
        /// Fence language, possibly empty
        language: String,
        /// Raw code
        code: &'a str,
    },
}

/// Decide whether a message is prose or code
///
/// An explicit `language` hint always wins. Without one, content that
/// already contains fences stays prose, and otherwise the heuristic runs
/// only when `detect` is set.
pub fn classify(message: &Message, detect: bool) -> Body<'_> {
    let content = message.content();
    if let Some(language) = message.language() {
        return Body::Code {
            language: language.to_string(),
            code: content,
        };
    }
    if detect && !content.contains("```") && looks_like_code(content) {
        return Body::Code {
            language: guess_language(content).unwrap_or_default().to_string(),
            code: content,
        };
    }
    Body::Prose(content)
}

/// Heuristic check for source code
pub fn looks_like_code(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }

    let keyword_lines = trimmed
        .lines()
        .map(|l| l.trim_start().to_lowercase())
        .filter(|l| LINE_STARTS.iter().any(|k| l.starts_with(k)))
        .count();
    let statement_end = trimmed.ends_with(&[';', '{', '}', ')', ':'][..]);
    if keyword_lines > 0 && (trimmed.lines().count() > 1 || statement_end) {
        return true;
    }

    let chars = trimmed.chars().count();
    let symbols = trimmed.chars().filter(|c| SYMBOLS.contains(*c)).count();
    chars >= 20 && symbols * 10 > chars
}

/// Best guess at the language of a code snippet
pub fn guess_language(content: &str) -> Option<&'static str> {
    let lower = content.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["fn ", "let mut ", "impl ", "pub struct ", "println!"]) {
        return Some("rust");
    }
    if has(&["def ", "import ", "print(", "if __name__"]) {
        return Some("python");
    }
    if has(&["function ", "const ", "console.log", "=> {"]) {
        return Some("javascript");
    }
    if has(&["<html", "<div", "<span", "<p>", "<!doctype"]) {
        return Some("html");
    }
    if has(&["color:", "margin:", "padding:", "font-size:"]) {
        return Some("css");
    }
    if has(&["select ", "insert into", "update ", "create table"]) {
        return Some("sql");
    }
    let trimmed = content.trim();
    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    {
        return Some("json");
    }
    if trimmed.starts_with("#!") || has(&["echo ", "cd ", "grep ", "export "]) {
        return Some("bash");
    }
    None
}

/// A backtick fence longer than any run inside `code`
pub fn fence_for(code: &str) -> String {
    let mut longest = 0;
    let mut current = 0;
    for c in code.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
