use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::{
    label_from_filename, Config, Note, NoteEntry, NoteSelector, ResearchError, Result,
    NOTE_EXTENSION,
};

/// Flat directory of Markdown research notes.
///
/// The directory listing itself is the index: there is no cache and no
/// metadata file, every listing is recomputed from disk.
#[derive(Debug, Clone)]
pub struct NoteStore {
    /// Directory where notes are stored
    notes_dir: PathBuf,

    /// Number of question words used for the filename slug
    slug_max_words: usize,
}

impl NoteStore {
    /// Creates a store rooted at `notes_dir`. Nothing touches the disk until first use.
    pub fn new(notes_dir: impl Into<PathBuf>, slug_max_words: usize) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            slug_max_words,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.notes_dir.clone(), config.slug_max_words)
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    /// Creates the notes directory if it is missing. Safe to call on every operation.
    pub fn ensure_dir(&self) -> Result<()> {
        if self.notes_dir.is_dir() {
            return Ok(());
        }

        debug!(
            "Notes directory does not exist, creating: {}",
            self.notes_dir.display()
        );
        fs::create_dir_all(&self.notes_dir).map_err(|e| {
            error!("Failed to create notes directory: {}", e);
            ResearchError::DirectoryError {
                path: self.notes_dir.clone(),
            }
        })
    }

    /// Saves a question/answer pair as a new note and returns the written path.
    ///
    /// # Arguments
    ///
    /// * `question` - The question exactly as submitted
    /// * `answer` - The assembled answer, written verbatim
    pub fn save_note(&self, question: &str, answer: &str) -> Result<PathBuf> {
        let note = Note::new(
            question.to_string(),
            answer.to_string(),
            self.slug_max_words,
        );
        self.write_note(&note)
    }

    /// Writes an already built note, creating or truncating its file.
    pub fn write_note(&self, note: &Note) -> Result<PathBuf> {
        self.ensure_dir()?;

        let path = self.notes_dir.join(&note.filename);
        info!("Saving note: {}", note.filename);

        if path.exists() {
            warn!(
                "Note {} already exists and will be overwritten",
                path.display()
            );
        }

        trace!("Writing note document");
        fs::write(&path, note.render()).map_err(|e| {
            error!("Failed to write note {}: {}", path.display(), e);
            ResearchError::StorageWrite {
                path: path.clone(),
                source: e,
            }
        })?;

        debug!("Note saved successfully: {}", path.display());
        Ok(path)
    }

    /// Lists every `.md` file in the notes directory, most recent first.
    ///
    /// A missing directory simply means there are no notes yet.
    pub fn list_notes(&self) -> Result<Vec<NoteEntry>> {
        if !self.notes_dir.exists() {
            debug!(
                "Notes directory {} does not exist yet",
                self.notes_dir.display()
            );
            return Ok(Vec::new());
        }

        let suffix = format!(".{}", NOTE_EXTENSION);
        let mut filenames: Vec<String> = WalkDir::new(&self.notes_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry in notes directory: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(&suffix))
            .collect();

        filenames.sort_unstable_by(|a, b| b.cmp(a));

        let notes: Vec<NoteEntry> = filenames
            .into_iter()
            .map(|filename| NoteEntry {
                label: label_from_filename(&filename),
                path: self.notes_dir.join(&filename),
                filename,
            })
            .collect();

        trace!("Listed {} notes", notes.len());
        Ok(notes)
    }

    /// Reads the raw text of a note.
    pub fn load_note(&self, path: &Path) -> Result<String> {
        debug!("Loading note from file: {}", path.display());

        fs::read_to_string(path).map_err(|e| {
            error!("Failed to open note file {}: {}", path.display(), e);
            if e.kind() == ErrorKind::NotFound {
                ResearchError::NoteNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ResearchError::StorageRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    /// Finds the listing entry a selector refers to.
    pub fn resolve(&self, selector: &NoteSelector) -> Result<NoteEntry> {
        match selector {
            NoteSelector::Index(index) => {
                let notes = self.list_notes()?;
                let count = notes.len();
                index
                    .checked_sub(1)
                    .and_then(|position| notes.into_iter().nth(position))
                    .ok_or_else(|| ResearchError::ApplicationError {
                        message: format!("No note number {} ({} notes saved)", index, count),
                    })
            }
            NoteSelector::Filename(filename) => {
                let suffix = format!(".{}", NOTE_EXTENSION);
                let bare = Path::new(filename)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .filter(|name| *name == filename.as_str() && name.ends_with(&suffix));

                let Some(bare) = bare else {
                    return Err(ResearchError::ApplicationError {
                        message: format!("'{}' is not a note filename", filename),
                    });
                };

                let path = self.notes_dir.join(bare);
                if !path.is_file() {
                    return Err(ResearchError::NoteNotFound { path });
                }

                Ok(NoteEntry {
                    label: label_from_filename(bare),
                    filename: bare.to_string(),
                    path,
                })
            }
        }
    }
}
