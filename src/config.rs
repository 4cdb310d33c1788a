use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::{ResearchError, Result, DEFAULT_SLUG_WORDS};

const DEFAULT_INSTRUCTIONS: &str = "\
1. Search the web and provide well-researched responses.

2. With every response, you must:
    - Include source citations with URLs when available.
    - Distinguish facts from opinions.
    - Note if information may be outdated.

3. Start with a concise answer, then provide supporting details.

4. Keep responses focused and scannable with clear headings.
";

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory where notes are stored
    pub notes_dir: PathBuf,

    /// Base URL of an OpenAI-compatible chat completions API
    pub api_base: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Display name of the agent
    pub agent_name: String,

    /// Opening line of the system prompt
    pub description: String,

    /// Behavioural rules appended to the system prompt
    pub instructions: String,

    /// Ask the model to format answers as Markdown
    pub markdown: bool,

    /// Tell the model the current local date and time
    pub add_datetime_to_context: bool,

    /// Send earlier exchanges of the session along with the question
    pub add_history_to_context: bool,

    /// How many earlier question/answer exchanges to send
    pub num_history_runs: usize,

    /// Stream answers by default
    pub stream: bool,

    /// Words of the question used in note filenames
    pub slug_max_words: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_dir: PathBuf::from("research_notes"),
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-3-pro-preview".to_string(),
            agent_name: "Research Agent".to_string(),
            description: "You are a research agent with access to the web. \
                You can search the web and provide well-researched responses."
                .to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            markdown: true,
            add_datetime_to_context: true,
            add_history_to_context: true,
            num_history_runs: 3,
            stream: true,
            slug_max_words: DEFAULT_SLUG_WORDS,
        }
    }
}

impl Config {
    /// Platform default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "research-notes")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads the configuration file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(
                "No configuration file at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read configuration {}: {}", path.display(), e);
            ResearchError::Io(e)
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|e| {
            error!("Failed to parse configuration {}: {}", path.display(), e);
            ResearchError::ConfigError {
                message: format!("{}: {}", path.display(), e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create config directory: {}", e);
                    ResearchError::DirectoryError {
                        path: parent.to_path_buf(),
                    }
                })?;
            }
        }

        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Updates one setting from its textual form
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "notes_dir" => self.notes_dir = PathBuf::from(value),
            "api_base" => self.api_base = value.to_string(),
            "api_key_env" => self.api_key_env = value.to_string(),
            "model" => self.model = value.to_string(),
            "agent_name" => self.agent_name = value.to_string(),
            "description" => self.description = value.to_string(),
            "instructions" => self.instructions = value.to_string(),
            "markdown" => self.markdown = parse_bool(key, value)?,
            "add_datetime_to_context" => self.add_datetime_to_context = parse_bool(key, value)?,
            "add_history_to_context" => self.add_history_to_context = parse_bool(key, value)?,
            "num_history_runs" => self.num_history_runs = parse_number(key, value)?,
            "stream" => self.stream = parse_bool(key, value)?,
            "slug_max_words" => self.slug_max_words = parse_number(key, value)?,
            _ => {
                return Err(ResearchError::ConfigError {
                    message: format!("Unknown setting '{}'", key),
                })
            }
        }

        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.slug_max_words == 0 {
            return Err(ResearchError::ConfigError {
                message: "slug_max_words must be at least 1".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ResearchError::ConfigError {
                message: "model must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Reads the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ResearchError::ConfigError {
                message: format!(
                    "Set {} (in the environment or a .env file) to use the agent",
                    self.api_key_env
                ),
            })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ResearchError::ConfigError {
            message: format!("{} expects true or false, got '{}'", key, value),
        }),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| ResearchError::ConfigError {
        message: format!("{} expects a whole number, got '{}'", key, value),
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.num_history_runs, 3);
        assert_eq!(config.notes_dir, PathBuf::from("research_notes"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "model": "gemini-2.5-flash", "stream": false }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert!(!config.stream);
        assert_eq!(config.slug_max_words, DEFAULT_SLUG_WORDS);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.set("num_history_runs", "5").unwrap();
        config.set("markdown", "off").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.num_history_runs, 5);
        assert!(!loaded.markdown);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = Config::default();
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("stream", "maybe").is_err());
        assert!(config.set("num_history_runs", "-1").is_err());
        assert!(config.set("slug_max_words", "0").is_err());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ResearchError::ConfigError { .. })
        ));
    }
}
