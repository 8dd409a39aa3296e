//! Rendering options shared by every export format

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChatkeepError, Result};

/// Named option presets accepted by [`ExportOptions::preset`]
pub const PRESETS: &[&str] = &["default", "clean", "detailed", "presentation"];

const MIN_FONT_SIZE: u32 = 8;

/// Paper size of printable exports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    /// ISO A3
    A3,
    /// ISO A4
    #[default]
    A4,
    /// ISO A5
    A5,
    /// US Letter
    Letter,
    /// US Legal
    Legal,
}

impl PageSize {
    /// CSS `@page size` keyword
    pub fn as_css(&self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
        };
        f.write_str(name)
    }
}

impl FromStr for PageSize {
    type Err = ChatkeepError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a3" => Ok(PageSize::A3),
            "a4" => Ok(PageSize::A4),
            "a5" => Ok(PageSize::A5),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => Err(ChatkeepError::Validation(format!(
                "unknown page size '{}', expected one of: A3, A4, A5, Letter, Legal",
                other
            ))),
        }
    }
}

/// How a conversation is rendered
///
/// Every field has a default, so partial YAML in the `export.options`
/// config section is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Emit the conversation metadata block
    pub include_metadata: bool,
    /// Emit creation and message timestamps
    pub include_timestamps: bool,
    /// Emit a table of contents (markdown)
    pub include_toc: bool,
    /// Number message headings
    pub include_message_numbers: bool,
    /// Emit per-message metadata other than the language hint
    pub include_message_metadata: bool,
    /// Guess a code language when a message has no `language` hint
    pub detect_code: bool,
    /// `chrono` format string for timestamps
    pub timestamp_format: String,
    /// Printable page size
    pub page_size: PageSize,
    /// CSS margin of printable pages
    pub margin: String,
    /// Body font of printable exports
    pub font_family: String,
    /// Body font size in points
    pub font_size: u32,
    /// Messages per printed page section
    pub messages_per_page: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
            include_timestamps: true,
            include_toc: false,
            include_message_numbers: false,
            include_message_metadata: false,
            detect_code: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            page_size: PageSize::A4,
            margin: "1in".to_string(),
            font_family: "Arial".to_string(),
            font_size: 12,
            messages_per_page: 20,
        }
    }
}

impl ExportOptions {
    /// Options for a named preset
    ///
    /// # Examples
    ///
    /// ```
    /// use chatkeep::export::ExportOptions;
    ///
    /// let clean = ExportOptions::preset("clean").unwrap();
    /// assert!(!clean.include_metadata);
    /// assert!(ExportOptions::preset("fancy").is_err());
    /// ```
    pub fn preset(name: &str) -> Result<Self> {
        let base = Self::default();
        let options = match name.to_lowercase().as_str() {
            "default" => base,
            "clean" => Self {
                include_metadata: false,
                include_timestamps: false,
                ..base
            },
            "detailed" => Self {
                include_toc: true,
                include_message_numbers: true,
                include_message_metadata: true,
                ..base
            },
            "presentation" => Self {
                include_metadata: false,
                include_timestamps: false,
                include_toc: true,
                ..base
            },
            other => {
                return Err(ChatkeepError::Validation(format!(
                    "unknown export preset '{}', expected one of: {}",
                    other,
                    PRESETS.join(", ")
                ))
                .into())
            }
        };
        Ok(options)
    }

    /// Check option ranges
    pub fn validate(&self) -> Result<()> {
        if self.font_size < MIN_FONT_SIZE {
            return Err(ChatkeepError::Validation(format!(
                "font_size must be at least {}",
                MIN_FONT_SIZE
            ))
            .into());
        }
        if self.messages_per_page == 0 {
            return Err(ChatkeepError::Validation(
                "messages_per_page must be greater than 0".to_string(),
            )
            .into());
        }
        if self.timestamp_format.is_empty() {
            return Err(
                ChatkeepError::Validation("timestamp_format cannot be empty".to_string()).into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_named_preset_resolves() {
        for name in PRESETS {
            let options = ExportOptions::preset(name).unwrap();
            assert!(options.validate().is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_detailed_preset_adds_toc_and_numbers() {
        let options = ExportOptions::preset("Detailed").unwrap();
        assert!(options.include_toc);
        assert!(options.include_message_numbers);
        assert!(options.include_metadata);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let options: ExportOptions =
            serde_yaml::from_str("include_toc: true\npage_size: Letter\n").unwrap();
        assert!(options.include_toc);
        assert_eq!(options.page_size, PageSize::Letter);
        assert_eq!(options.messages_per_page, 20);
    }

    #[test]
    fn test_validate_rejects_tiny_font() {
        let options = ExportOptions {
            font_size: 4,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_page_size_parse() {
        assert_eq!("letter".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!(PageSize::Letter.as_css(), "letter");
        assert!("B5".parse::<PageSize>().is_err());
    }
}
