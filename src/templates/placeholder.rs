//! `{{name}}` placeholder scanning and substitution
//!
//! A placeholder is exactly `{{` + identifier + `}}`, where the identifier
//! matches `[A-Za-z_][A-Za-z0-9_]*`. Whitespace, filters and expressions are
//! not recognized; anything that does not match is literal text.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("placeholder pattern is valid")
    })
}

/// Names of every placeholder in `text`, sorted and deduplicated
///
/// # Examples
///
/// ```
/// use chatkeep::templates::placeholder::placeholders;
///
/// let names = placeholders("Review this {{language}} code: {{code}} ({{ code }})");
/// assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["code", "language"]);
/// ```
pub fn placeholders(text: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replace every placeholder with its value in a single pass
///
/// Substituted values are never re-scanned, so a value that itself contains
/// `{{x}}` is inserted verbatim. Placeholders without a value are left
/// untouched; callers check for missing names first.
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
