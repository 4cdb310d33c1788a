//! The persisted research note and the text transforms that name it.
use chrono::{DateTime, Local};

/// Slug used when a question has no usable ASCII alphanumerics.
pub const FALLBACK_SLUG: &str = "research-note";

/// Default number of leading question words that make up a slug.
pub const DEFAULT_SLUG_WORDS: usize = 6;

/// Extension shared by every note file.
pub const NOTE_EXTENSION: &str = "md";

/// `YYYYMMDD-HHMMSS`, fixed width so filenames sort chronologically.
const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// ISO-8601 local time with second precision, as written into the header.
const SAVED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Represents a single research result in our system
#[derive(Debug, Clone)]
pub struct Note {
    /// The question as the user typed it
    pub question: String,
    /// When the note was saved
    pub created_at: DateTime<Local>,
    /// Short identifier derived from the question
    pub slug: String,
    /// `{timestamp}-{slug}.md`; the note's identity inside the store
    pub filename: String,
    /// Answer text in Markdown format, kept verbatim
    pub answer: String,
}

impl Note {
    /// Creates a note stamped with the current local time
    pub fn new(question: String, answer: String, max_words: usize) -> Self {
        Self::at(question, answer, Local::now(), max_words)
    }

    /// Creates a note for an explicit save time
    pub fn at(
        question: String,
        answer: String,
        created_at: DateTime<Local>,
        max_words: usize,
    ) -> Self {
        let slug = slugify(&question, max_words);
        let filename = note_filename(&created_at, &slug);

        Note {
            question,
            created_at,
            slug,
            filename,
            answer,
        }
    }

    /// Renders the Markdown document written to disk.
    ///
    /// The header is informational only; nothing reads it back structurally.
    pub fn render(&self) -> String {
        format!(
            "# Research Note: {question}\n\
             \n\
             - **Saved at:** {saved_at}\n\
             - **File:** {filename}\n\
             \n\
             ---\n\
             \n\
             {answer}\n",
            question = self.question,
            saved_at = self.created_at.format(SAVED_AT_FORMAT),
            filename = self.filename,
            answer = self.answer,
        )
    }
}

/// Builds a short, filesystem-safe slug from the first `max_words` words of `text`.
///
/// Output only ever contains `[a-z0-9-]`, never starts or ends with a hyphen,
/// and falls back to [`FALLBACK_SLUG`] when nothing usable remains.
pub fn slugify(text: &str, max_words: usize) -> String {
    let short = text
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase();

    let mut slug = String::with_capacity(short.len());
    let mut pending_hyphen = false;

    for c in short.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// `{YYYYMMDD-HHMMSS}-{slug}.md`
pub fn note_filename(created_at: &DateTime<Local>, slug: &str) -> String {
    format!(
        "{}-{}.{}",
        created_at.format(FILENAME_TIMESTAMP_FORMAT),
        slug,
        NOTE_EXTENSION
    )
}
