//! Research notes application library
//!
//! This library asks a web-search-augmented research agent questions, assembles
//! its streamed or complete answers, and keeps every answer as a Markdown note.

mod agent;
mod assembler;
mod cli;
mod config;
mod errors;
mod helper;
mod note;
mod session;
mod storage;
mod types;

// Re-export key components
pub use agent::*;
pub use assembler::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use note::*;
pub use session::*;
pub use storage::*;
pub use types::*;
