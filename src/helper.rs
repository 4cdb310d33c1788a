use log::debug;

use crate::{ResearchError, Result};

/// Derives the display label for a note from its filename.
///
/// Everything up to the first hyphen is dropped, the extension removed,
/// remaining hyphens become spaces and the result is title-cased. Since the
/// timestamp itself contains a hyphen, the time-of-day digits stay in the label.
pub fn label_from_filename(filename: &str) -> String {
    let rest = match filename.split_once('-') {
        Some((_, rest)) => rest,
        None => filename,
    };

    title_case(&rest.replace(".md", "").replace('-', " "))
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alphabetic = false;

    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_alphabetic {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_alphabetic = true;
        } else {
            out.push(c);
            previous_alphabetic = false;
        }
    }

    out
}

// Helper method for parsing `key=value` settings
pub fn parse_key_value(setting: &str) -> Result<(String, String)> {
    let (key, value) = setting
        .split_once('=')
        .ok_or_else(|| ResearchError::ConfigError {
            message: format!("Expected key=value, got '{}'", setting),
        })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ResearchError::ConfigError {
            message: format!("Missing key in '{}'", setting),
        });
    }

    debug!("Parsed setting {} = {}", key, value.trim());
    Ok((key.to_string(), value.trim().to_string()))
}

/// How a user picked a note from the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteSelector {
    /// 1-based position in the most-recent-first listing
    Index(usize),
    /// Exact filename inside the notes directory
    Filename(String),
}

/// Interprets `open` arguments: a positive number is a listing position, anything else a filename.
pub fn parse_note_selector(raw: &str) -> Result<NoteSelector> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ResearchError::ApplicationError {
            message: "Select a note by number or filename".to_string(),
        });
    }

    match raw.parse::<usize>() {
        Ok(0) => Err(ResearchError::ApplicationError {
            message: "Note numbers start at 1".to_string(),
        }),
        Ok(index) => Ok(NoteSelector::Index(index)),
        Err(_) => Ok(NoteSelector::Filename(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_keeps_time_digits_and_titles_words() {
        assert_eq!(
            label_from_filename("20250314-092653-what-is-rust.md"),
            "092653 What Is Rust"
        );
    }

    #[test]
    fn label_without_hyphen_uses_whole_name() {
        assert_eq!(label_from_filename("scratch.md"), "Scratch");
    }

    #[test]
    fn title_case_restarts_after_digits_and_symbols() {
        assert_eq!(title_case("hello world"), "Hello World");
        assert_eq!(title_case("rust 2024edition"), "Rust 2024Edition");
        assert_eq!(title_case("MIXED case"), "Mixed Case");
    }

    #[test]
    fn key_value_parsing() {
        assert_eq!(
            parse_key_value("model = gemini").unwrap(),
            ("model".to_string(), "gemini".to_string())
        );
        assert_eq!(
            parse_key_value("api_base=http://x/y?a=b").unwrap().1,
            "http://x/y?a=b"
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(parse_note_selector("3").unwrap(), NoteSelector::Index(3));
        assert_eq!(
            parse_note_selector(" 20250314-092653-x.md ").unwrap(),
            NoteSelector::Filename("20250314-092653-x.md".to_string())
        );
        assert!(parse_note_selector("0").is_err());
        assert!(parse_note_selector("  ").is_err());
    }
}
