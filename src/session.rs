use log::debug;

use crate::{ChatMessage, Role};

/// A note that was loaded back for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedNote {
    pub filename: String,
    pub content: String,
}

/// Mutable per-session state, owned by the interaction loop.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Conversation so far, oldest first
    messages: Vec<ChatMessage>,

    /// Last note loaded from the store
    loaded_note: Option<LoadedNote>,

    /// Whether the loaded note is what the user is currently looking at
    show_loaded_note: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Records a completed question/answer exchange.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::assistant(answer));
    }

    /// The last `num_runs` complete exchanges, oldest first.
    pub fn history(&self, num_runs: usize) -> Vec<ChatMessage> {
        if num_runs == 0 {
            return Vec::new();
        }

        let mut runs_seen = 0;
        let mut start = self.messages.len();
        for (index, message) in self.messages.iter().enumerate().rev() {
            if message.role == Role::User {
                runs_seen += 1;
                start = index;
                if runs_seen == num_runs {
                    break;
                }
            }
        }

        self.messages[start..].to_vec()
    }

    /// A fresh question is being run; any loaded note is no longer on screen.
    pub fn begin_submission(&mut self) {
        self.show_loaded_note = false;
    }

    pub fn load(&mut self, filename: &str, content: String) {
        debug!("Session now shows note {}", filename);
        self.loaded_note = Some(LoadedNote {
            filename: filename.to_string(),
            content,
        });
        self.show_loaded_note = true;
    }

    /// The loaded note, if it is currently shown.
    pub fn visible_note(&self) -> Option<&LoadedNote> {
        self.loaded_note
            .as_ref()
            .filter(|note| self.show_loaded_note && !note.content.is_empty())
    }

    /// The clear action: forget any loaded note.
    pub fn clear_loaded_note(&mut self) {
        self.loaded_note = None;
        self.show_loaded_note = false;
    }
}
