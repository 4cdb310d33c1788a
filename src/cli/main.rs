use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser, Debug)]
#[clap(
    name = "research-notes",
    version,
    about = "Web-powered research agent that keeps its answers as Markdown notes"
)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Path to the notes directory
    #[clap(long, value_parser)]
    pub notes_dir: Option<PathBuf>,

    /// Model to use instead of the configured one
    #[clap(short, long)]
    pub model: Option<String>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the research-notes application
    #[clap(subcommand)]
    pub command: Commands,
}
