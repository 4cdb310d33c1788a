//! Core data structures for the research-notes application.
//!
//! This module contains the shared value types used throughout the application,
//! including the CLI subcommands and conversation messages.
use std::path::PathBuf;

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::ResearchError;

/// A specialized Result type for research-notes operations.
pub type Result<T> = std::result::Result<T, ResearchError>;

/// One row of the note listing: what the user sees and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteEntry {
    /// Human-facing name derived from the filename
    pub label: String,
    /// Bare filename, `{timestamp}-{slug}.md`
    pub filename: String,
    /// Full path inside the notes directory
    pub path: PathBuf,
}

/// Who produced a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation turn, in the shape chat-completion APIs expect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How the answer is obtained from the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Incremental fragments rendered as they arrive
    Stream,
    /// One complete result object
    Batch,
}

impl ResponseMode {
    pub fn from_stream_flag(stream: bool) -> Self {
        if stream {
            ResponseMode::Stream
        } else {
            ResponseMode::Batch
        }
    }
}

/// Available subcommands for the research-notes application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the research agent a question and save the answer as a note
    Ask {
        /// The research question
        #[clap(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Wait for the complete answer instead of streaming it
        #[clap(short, long)]
        batch: bool,

        /// Show the answer without saving it
        #[clap(long)]
        no_save: bool,
    },

    /// List saved research notes, most recent first
    Notes {
        /// Limit the number of notes shown
        #[clap(short = 'n', long)]
        limit: Option<usize>,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show a saved note by its number in the listing or its filename
    Open {
        /// Listing number (1 = most recent) or filename
        selector: String,
    },

    /// Start an interactive research session
    Chat {
        /// Wait for complete answers instead of streaming them
        #[clap(short, long)]
        batch: bool,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}
