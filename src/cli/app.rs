//! CLI module for the research-notes application
//!
//! This module handles the command-line interface: one-shot questions,
//! browsing saved notes, the interactive chat session and configuration.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use console::style;
use log::{debug, error, info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::{
    collect_answer, parse_key_value, parse_note_selector, Agent, AgentCell,
    ChatCompletionsAgent, Commands, Config, DisplaySink, NoteEntry, NoteStore, ResearchError,
    ResponseMode, Result, RunContext, SessionState, TerminalSink,
};

/// Outcome of one submitted question.
#[derive(Debug)]
pub struct Submission {
    /// The assembled answer, as displayed
    pub answer: String,

    /// Where the note was written, if it was saved
    pub saved: Option<PathBuf>,

    /// Why saving failed; the answer is still valid
    pub save_error: Option<ResearchError>,
}

/// One line typed into the chat session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    Notes,
    Open(String),
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return ChatCommand::Ask(line.to_string());
        };

        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (command, ""),
        };

        match name {
            "notes" | "list" => ChatCommand::Notes,
            "open" | "load" => ChatCommand::Open(argument.to_string()),
            "clear" => ChatCommand::Clear,
            "help" | "?" => ChatCommand::Help,
            "quit" | "exit" | "q" => ChatCommand::Quit,
            _ => ChatCommand::Unknown(name.to_string()),
        }
    }
}

const CHAT_HELP: &str = "\
Type a research question and press enter.
  /notes        list saved research notes
  /open <n>     show a saved note (number from /notes, or filename)
  /clear        hide the loaded note
  /help         show this help
  /quit         leave the session";

/// CLI Application handler - processes CLI commands and interfaces with NoteStore
pub struct App {
    /// The note storage backend
    store: NoteStore,

    /// Application configuration
    config: Config,

    /// Where `config` was loaded from and is saved to
    config_path: PathBuf,

    /// Research agent, built on first use
    agent: AgentCell,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Create a new CLI application with the given config
    pub fn new(config: Config, config_path: PathBuf, verbose: bool) -> Self {
        Self {
            store: NoteStore::from_config(&config),
            config,
            config_path,
            agent: AgentCell::new(),
            verbose,
        }
    }

    /// Create an application that uses `agent` instead of building one from config
    pub fn with_agent(config: Config, config_path: PathBuf, agent: Arc<dyn Agent>) -> Self {
        Self {
            store: NoteStore::from_config(&config),
            config,
            config_path,
            agent: AgentCell::with_agent(agent),
            verbose: false,
        }
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Ask {
                question,
                batch,
                no_save,
            } => {
                let mode = self.response_mode(batch);
                let mut session = SessionState::new();
                self.ask_and_report(&mut session, &question.join(" "), mode, !no_save)
                    .await?
            }

            Commands::Notes { limit, json } => self.print_notes(limit, json)?,

            Commands::Open { selector } => {
                let mut session = SessionState::new();
                self.open_note(&mut session, &selector)?
            }

            Commands::Chat { batch } => self.chat(self.response_mode(batch)).await?,

            Commands::Config { show, set, reset } => self.handle_config(show, set, reset)?,
        }

        Ok(())
    }

    fn response_mode(&self, batch: bool) -> ResponseMode {
        if batch {
            ResponseMode::Batch
        } else {
            ResponseMode::from_stream_flag(self.config.stream)
        }
    }

    fn agent(&self) -> Result<Arc<dyn Agent>> {
        self.agent.get_or_try_init(|| {
            let agent = ChatCompletionsAgent::from_config(&self.config)?;
            Ok(Arc::new(agent) as Arc<dyn Agent>)
        })
    }

    fn run_context(&self, session: &SessionState) -> RunContext {
        RunContext {
            history: if self.config.add_history_to_context {
                session.history(self.config.num_history_runs)
            } else {
                Vec::new()
            },
            now: self.config.add_datetime_to_context.then(Local::now),
        }
    }

    /// Handles one submitted question: ask, display, record and (optionally) save.
    ///
    /// Blank questions and agent failures return an error and never write a note.
    /// A failed save is reported in the returned [`Submission`] instead, because
    /// the answer itself is still good.
    pub async fn submit(
        &self,
        session: &mut SessionState,
        question: &str,
        mode: ResponseMode,
        save: bool,
        sink: &mut dyn DisplaySink,
    ) -> Result<Submission> {
        session.begin_submission();

        if question.trim().is_empty() {
            return Err(ResearchError::InputEmpty);
        }

        let agent = self.agent()?;
        let context = self.run_context(session);
        debug!(
            "Submitting question with {} history messages",
            context.history.len()
        );

        let answer = collect_answer(agent.as_ref(), question, &context, mode, sink).await?;
        session.record_exchange(question, &answer);

        if answer.trim().is_empty() {
            warn!("Agent returned an empty answer, not saving a note");
            return Ok(Submission {
                answer,
                saved: None,
                save_error: None,
            });
        }

        if !save {
            return Ok(Submission {
                answer,
                saved: None,
                save_error: None,
            });
        }

        match self.store.save_note(question, &answer) {
            Ok(path) => {
                info!("Research saved to {}", path.display());
                Ok(Submission {
                    answer,
                    saved: Some(path),
                    save_error: None,
                })
            }
            Err(e) => {
                error!("Failed to save research note: {}", e);
                Ok(Submission {
                    answer,
                    saved: None,
                    save_error: Some(e),
                })
            }
        }
    }

    async fn ask_and_report(
        &self,
        session: &mut SessionState,
        question: &str,
        mode: ResponseMode,
        save: bool,
    ) -> Result<()> {
        if !question.trim().is_empty() {
            println!("{}", style("✅ Answer").bold().green());
        }

        let mut sink = TerminalSink::new();
        let submission = self.submit(session, question, mode, save, &mut sink).await?;
        println!();

        if submission.answer.trim().is_empty() {
            println!("{}", style("The agent returned an empty answer.").yellow());
        }

        if let Some(path) = &submission.saved {
            println!(
                "{} {}",
                style("Saved this research as:").green(),
                style(file_name(path)).bold()
            );
        }

        match submission.save_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn print_notes(&self, limit: Option<usize>, json: bool) -> Result<()> {
        let notes = self.store.list_notes()?;

        if !json && notes.is_empty() {
            println!(
                "{}",
                style("No notes yet. Run research to create your first note.").dim()
            );
            return Ok(());
        }

        let notes = limit_notes(notes, limit)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&notes)?);
            return Ok(());
        }

        println!("{}", style("📁 Saved Research Notes").bold());
        for (i, note) in notes.iter().enumerate() {
            if self.verbose {
                println!(
                    "{:>3}. {}  {}",
                    i + 1,
                    note.label,
                    style(note.path.display()).dim()
                );
            } else {
                println!("{:>3}. {}", i + 1, note.label);
            }
        }

        Ok(())
    }

    fn open_note(&self, session: &mut SessionState, selector: &str) -> Result<()> {
        let selector = parse_note_selector(selector)?;
        let entry = self.store.resolve(&selector)?;
        let content = self.store.load_note(&entry.path)?;
        session.load(&entry.filename, content);

        if let Some(note) = session.visible_note() {
            println!("{}", style("📂 Loaded Research Note").bold().cyan());
            println!("{}", note.content);
        }

        Ok(())
    }

    async fn chat(&self, mode: ResponseMode) -> Result<()> {
        println!(
            "{} {}",
            style(format!("🔍 {}", self.config.agent_name)).bold(),
            style(format!("({})", self.config.model)).dim()
        );
        println!("Ask me anything! Type /help for commands.");

        let mut session = SessionState::new();
        let mut lines = BufReader::new(stdin()).lines();

        loop {
            print!("{} ", style("research>").cyan().bold());
            std::io::Write::flush(&mut std::io::stdout())?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };

            let outcome = match ChatCommand::parse(&line) {
                ChatCommand::Quit => break,
                ChatCommand::Ask(question) => {
                    self.ask_and_report(&mut session, &question, mode, true)
                        .await
                }
                ChatCommand::Notes => self.print_notes(None, false),
                ChatCommand::Open(selector) => self.open_note(&mut session, &selector),
                ChatCommand::Clear => {
                    session.clear_loaded_note();
                    println!("{}", style("Cleared.").dim());
                    Ok(())
                }
                ChatCommand::Help => {
                    println!("{}", CHAT_HELP);
                    Ok(())
                }
                ChatCommand::Unknown(name) => Err(ResearchError::ApplicationError {
                    message: format!("Unknown command /{}. Type /help for commands.", name),
                }),
            };

            if let Err(e) = outcome {
                report_error(&e);
            }
        }

        info!("Chat session ended after {} messages", session.messages().len());
        Ok(())
    }

    fn handle_config(&self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        if reset {
            Config::default().save(&self.config_path)?;
            println!(
                "Configuration reset to defaults at {}",
                self.config_path.display()
            );
            return Ok(());
        }

        if let Some(setting) = set {
            let (key, value) = parse_key_value(&setting)?;
            let mut config = Config::load(&self.config_path)?;
            config.set(&key, &value)?;
            config.save(&self.config_path)?;
            println!("Set {} = {}", style(&key).bold(), value);
            return Ok(());
        }

        if !show {
            debug!("No configuration change requested, showing current settings");
        }
        println!("{}", style(self.config_path.display()).dim());
        println!("{}", serde_json::to_string_pretty(&self.config)?);

        Ok(())
    }
}

/// Applies `notes -n`; a limit of zero is rejected rather than showing nothing.
fn limit_notes(mut notes: Vec<NoteEntry>, limit: Option<usize>) -> Result<Vec<NoteEntry>> {
    match limit {
        Some(0) => Err(ResearchError::ApplicationError {
            message: "The note limit must be at least 1".to_string(),
        }),
        Some(limit) => {
            notes.truncate(limit);
            Ok(notes)
        }
        None => Ok(notes),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Prints a user-facing error message for a failed operation.
pub fn report_error(e: &ResearchError) {
    match e {
        ResearchError::InputEmpty => eprintln!("{}", style(format!("⚠️  {}", e)).yellow()),
        _ => eprintln!("{}", style(format!("❌ {}", e)).red()),
    }
}
