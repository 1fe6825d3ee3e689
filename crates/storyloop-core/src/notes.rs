//! Human-readable decision journal.
//!
//! Each entry is appended as `\n### YYYY-mm-dd HH:MM\n<text>\n`.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::ReportError;

#[derive(Debug, Clone)]
pub struct NotesJournal {
    path: PathBuf,
}

impl NotesJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry, creating the file and its parent directory as needed.
    pub fn try_append(&self, text: &str) -> Result<(), ReportError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write!(file, "{}", render_entry(&Local::now().format("%Y-%m-%d %H:%M").to_string(), text))?;
        Ok(())
    }

    /// Append an entry; failures are logged and otherwise ignored.
    pub fn append(&self, text: &str) {
        if let Err(err) = self.try_append(text) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to append note");
        }
    }
}

fn render_entry(stamp: &str, text: &str) -> String {
    format!("\n### {stamp}\n{text}\n")
}
