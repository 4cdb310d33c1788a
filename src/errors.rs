//! Error types for the research-notes application.
//!
//! This module defines the failures that can occur while asking the agent,
//! assembling its answer, and persisting or loading notes.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the research-notes application.
#[derive(Error, Debug)]
pub enum ResearchError {
    /// Errors related to file I/O operations that are not tied to a note path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level failures while talking to the agent endpoint.
    #[error("Error while running agent: {0}")]
    Http(#[from] reqwest::Error),

    /// The submitted question was blank.
    #[error("Please enter a question.")]
    InputEmpty,

    /// The agent call (or its response stream) failed.
    #[error("Error while running agent: {message}")]
    AgentInvocation { message: String },

    /// The notes directory could not be created.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// A note file could not be written.
    #[error("Failed to save note {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A previously listed note is gone.
    #[error("Note not found: {path}")]
    NoteNotFound { path: PathBuf },

    /// A note exists but could not be read.
    #[error("Failed to read note {path}: {source}")]
    StorageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl ResearchError {
    /// Wraps any agent-side failure into the user-facing invocation error.
    pub fn agent(message: impl Into<String>) -> Self {
        ResearchError::AgentInvocation {
            message: message.into(),
        }
    }

    /// True for failures that happened before or while producing an answer.
    pub fn is_agent_failure(&self) -> bool {
        matches!(
            self,
            ResearchError::AgentInvocation { .. } | ResearchError::Http(_)
        )
    }
}
