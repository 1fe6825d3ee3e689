//! Backlog persistence with self-healing load.
//!
//! Loading never fails: a missing file is an empty backlog, and a document
//! that no repair pass can fix is backed up next to the original before an
//! empty backlog is returned. Callers must not persist over such a load.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde_yaml::Value as YamlValue;
use tracing::{error, info, warn};

use crate::domain::{Estimate, Priority, Result, StoreError, Story, StoryStatus};
use crate::notes::NotesJournal;
use crate::obs;
use crate::self_healing::REPAIR_PASSES;

/// How a backlog document was loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    /// The file does not exist.
    Missing,
    /// Parsed as-is.
    Clean,
    /// Parsed after the named repair passes fired.
    Repaired { passes: Vec<&'static str> },
    /// Nothing parsed; the original content was copied to `backup`.
    Unrecoverable {
        error: String,
        backup: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct LoadedBacklog {
    pub stories: Vec<Story>,
    pub report: LoadReport,
}

/// Outcome of [`StoryStore::reopen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReopenSummary {
    pub reopened: Vec<String>,
    pub backup: Option<PathBuf>,
}

/// Enum-valued keys whose bad values are set aside instead of failing the story.
const SALVAGED_KEYS: &[&str] = &["status", "priority", "estimate"];

/// A value that did not parse, kept on the story as `unrecognized_<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalvagedField {
    pub story_id: String,
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBacklog {
    pub stories: Vec<Story>,
    pub salvaged: Vec<SalvagedField>,
}

/// Parse a backlog document: a top-level list, or a mapping with a `stories` list.
///
/// An empty document is an empty backlog. Stories are parsed one by one; a
/// story whose status is not recognized is parked as `blocked_fatal`.
pub fn parse_backlog(text: &str) -> std::result::Result<ParsedBacklog, StoreError> {
    let doc: YamlValue = serde_yaml::from_str(text)?;
    let items = match doc {
        YamlValue::Null => return Ok(ParsedBacklog::default()),
        YamlValue::Sequence(items) => items,
        YamlValue::Mapping(mut map) => match map.remove("stories") {
            Some(YamlValue::Sequence(items)) => items,
            Some(YamlValue::Null) => return Ok(ParsedBacklog::default()),
            _ => return Err(StoreError::UnexpectedShape),
        },
        _ => return Err(StoreError::UnexpectedShape),
    };

    let mut parsed = ParsedBacklog::default();
    for item in items {
        let story = parse_story(item, &mut parsed.salvaged)?;
        parsed.stories.push(story);
    }
    Ok(parsed)
}

fn parse_story(
    item: YamlValue,
    salvaged: &mut Vec<SalvagedField>,
) -> std::result::Result<Story, StoreError> {
    let err = match serde_yaml::from_value::<Story>(item.clone()) {
        Ok(story) => return Ok(story),
        Err(err) => err,
    };
    let YamlValue::Mapping(mut map) = item else {
        return Err(err.into());
    };

    let mut changed = false;
    let mut stashed = Vec::new();
    for key in SALVAGED_KEYS {
        let Some(value) = map.get(*key) else {
            continue;
        };
        if value.is_null() {
            map.remove(*key);
            changed = true;
        } else if !value_parses(key, value) {
            if let Some(value) = map.remove(*key) {
                stashed.push((*key, value));
            }
            changed = true;
        }
    }
    if !changed {
        return Err(err.into());
    }

    let mut story: Story = serde_yaml::from_value(YamlValue::Mapping(map))?;
    for (key, value) in stashed {
        if key == "status" {
            story.status = StoryStatus::BlockedFatal;
        }
        salvaged.push(SalvagedField {
            story_id: story.id.clone(),
            key,
            value: scalar_text(&value),
        });
        story
            .extra
            .insert(format!("unrecognized_{key}").into(), value);
    }
    Ok(story)
}

fn value_parses(key: &str, value: &YamlValue) -> bool {
    let Some(text) = value.as_str() else {
        return false;
    };
    match key {
        "status" => text.parse::<StoryStatus>().is_ok(),
        "priority" => text.parse::<Priority>().is_ok(),
        "estimate" => text.parse::<Estimate>().is_ok(),
        _ => true,
    }
}

fn scalar_text(value: &YamlValue) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Run the repair passes in order until the document parses.
///
/// Returns the parsed backlog and the passes that fired, or the last parse error.
pub fn heal(text: &str) -> std::result::Result<(ParsedBacklog, Vec<&'static str>), StoreError> {
    let mut last_err = match parse_backlog(text) {
        Ok(parsed) => return Ok((parsed, Vec::new())),
        Err(err) => err,
    };

    let mut current = text.to_string();
    let mut fired = Vec::new();
    for pass in REPAIR_PASSES {
        let Some(next) = (pass.apply)(&current) else {
            continue;
        };
        current = next;
        fired.push(pass.name);
        match parse_backlog(&current) {
            Ok(parsed) => return Ok((parsed, fired)),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

/// The backlog file plus the journal its fatal notes go to.
#[derive(Debug, Clone)]
pub struct StoryStore {
    path: PathBuf,
    notes: Option<NotesJournal>,
}

impl StoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: NotesJournal) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the backlog, healing it if needed. Never fails.
    pub fn load(&self) -> Vec<Story> {
        self.load_detailed().stories
    }

    /// Load the backlog and report which path the loader took.
    pub fn load_detailed(&self) -> LoadedBacklog {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return LoadedBacklog {
                    stories: Vec::new(),
                    report: LoadReport::Missing,
                }
            }
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "failed to read backlog");
                self.note(&format!("FATAL: cannot read backlog {}: {err}", self.path.display()));
                return LoadedBacklog {
                    stories: Vec::new(),
                    report: LoadReport::Unrecoverable {
                        error: err.to_string(),
                        backup: None,
                    },
                };
            }
        };

        match heal(&text) {
            Ok((parsed, passes)) => {
                self.report_salvaged(&parsed.salvaged);
                self.loaded(parsed.stories, passes)
            }
            Err(err) => {
                let backup = match self.write_backup(&text, "broken") {
                    Ok(path) => Some(path),
                    Err(backup_err) => {
                        error!(error = %backup_err, "failed to back up broken backlog");
                        None
                    }
                };
                error!(
                    path = %self.path.display(),
                    error = %err,
                    backup = ?backup,
                    "backlog unrecoverable; continuing with an empty backlog"
                );
                obs::emit_backlog_fatal(&self.path, &err);
                self.note(&format!(
                    "FATAL: backlog {} could not be parsed ({err}). Backup: {}. Continuing with an empty backlog.",
                    self.path.display(),
                    backup
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "none".to_string())
                ));
                LoadedBacklog {
                    stories: Vec::new(),
                    report: LoadReport::Unrecoverable {
                        error: err.to_string(),
                        backup,
                    },
                }
            }
        }
    }

    fn loaded(&self, stories: Vec<Story>, passes: Vec<&'static str>) -> LoadedBacklog {
        if passes.is_empty() {
            return LoadedBacklog {
                stories,
                report: LoadReport::Clean,
            };
        }
        warn!(path = %self.path.display(), passes = ?passes, "backlog repaired on load");
        obs::emit_backlog_repaired(&self.path, &passes);
        self.note(&format!(
            "Backlog {} repaired on load ({})",
            self.path.display(),
            passes.join(", ")
        ));
        LoadedBacklog {
            stories,
            report: LoadReport::Repaired { passes },
        }
    }

    fn report_salvaged(&self, salvaged: &[SalvagedField]) {
        for field in salvaged {
            warn!(
                story_id = %field.story_id,
                key = field.key,
                value = %field.value,
                "unrecognized value set aside"
            );
            let parked = if field.key == "status" {
                "; story parked as blocked_fatal"
            } else {
                ""
            };
            self.note(&format!(
                "{}: unrecognized {} '{}' kept as unrecognized_{}{parked}",
                field.story_id, field.key, field.value, field.key
            ));
        }
    }

    /// Overwrite the backlog with `stories`, in order.
    pub fn persist(&self, stories: &[Story]) -> std::result::Result<(), StoreError> {
        let yaml = serde_yaml::to_string(stories)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, yaml).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Reset stories to `todo`: all of them when `only` is empty, otherwise
    /// those whose status is in `only`.
    ///
    /// The current file is copied to `<file>.bak.<timestamp>` first.
    pub fn reopen(&self, only: &[StoryStatus]) -> Result<ReopenSummary> {
        let loaded = self.load_detailed();
        if let LoadReport::Unrecoverable { error, .. } = loaded.report {
            return Err(StoreError::Unrecoverable(error).into());
        }
        let mut stories = loaded.stories;
        let mut reopened = Vec::new();
        for story in stories.iter_mut() {
            if only.is_empty() || only.contains(&story.status) {
                story.status = StoryStatus::Todo;
                reopened.push(story.id.clone());
            }
        }

        let backup = self.backup_current()?;
        self.persist(&stories)?;
        info!(path = %self.path.display(), reopened = reopened.len(), "stories reopened");
        Ok(ReopenSummary { reopened, backup })
    }

    /// Heal the backlog and rewrite it in normalized form.
    ///
    /// Nothing is written when the document cannot be recovered.
    pub fn repair(&self) -> Result<LoadedBacklog> {
        let loaded = self.load_detailed();
        match loaded.report {
            LoadReport::Missing | LoadReport::Unrecoverable { .. } => {}
            LoadReport::Clean | LoadReport::Repaired { .. } => self.persist(&loaded.stories)?,
        }
        Ok(loaded)
    }

    fn backup_current(&self) -> Result<Option<PathBuf>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(self.write_backup(&content, "bak")?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }
            .into()),
        }
    }

    /// `broken` backups are `<file>.<ts>.broken`; `bak` backups are `<file>.bak.<ts>`.
    fn write_backup(&self, content: &str, kind: &str) -> std::result::Result<PathBuf, StoreError> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stories.yaml".to_string());
        let backup_name = if kind == "broken" {
            format!("{file_name}.{stamp}.broken")
        } else {
            format!("{file_name}.{kind}.{stamp}")
        };
        let backup = self.path.with_file_name(backup_name);
        std::fs::write(&backup, content).map_err(|source| StoreError::Write {
            path: backup.clone(),
            source,
        })?;
        Ok(backup)
    }

    fn note(&self, text: &str) {
        if let Some(notes) = &self.notes {
            notes.append(text);
        }
    }
}
