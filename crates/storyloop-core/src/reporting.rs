//! Run artifacts: developer failure reports, run summaries, role timings
//! and their retention.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::{ReportError, Story, StoryStatus};

/// Written when a story is blocked after exhausting developer retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevFailureReport {
    pub story_id: String,
    pub attempts: u32,
    pub reason: String,
    /// The last Developer result, verbatim.
    pub last_result: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn story_dir(artifacts: &Path, story_id: &str) -> PathBuf {
    let safe: String = story_id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    artifacts.join("dev").join(safe)
}

/// Persist `<artifacts>/dev/<story_id>/failure_report.json` and its `.digest` sidecar.
pub fn write_failure_report(
    report: &DevFailureReport,
    artifacts: &Path,
) -> Result<PathBuf, ReportError> {
    let dir = story_dir(artifacts, &report.story_id);
    std::fs::create_dir_all(&dir)?;

    let report_path = dir.join("failure_report.json");
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&report_path, &json)?;
    std::fs::write(dir.join("failure_report.digest"), sha256_hex(&json))?;
    Ok(report_path)
}

/// Read `<artifacts>/dev/<story_id>/failure_report.json`, verifying its digest.
pub fn read_failure_report(story_id: &str, artifacts: &Path) -> Result<DevFailureReport, ReportError> {
    let dir = story_dir(artifacts, story_id);
    let json = std::fs::read(dir.join("failure_report.json"))?;
    let expected = std::fs::read_to_string(dir.join("failure_report.digest"))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(ReportError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

/// End-of-run snapshot of the backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: u32,
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
    pub done: Vec<String>,
    pub blocked: Vec<String>,
    pub pending: Vec<String>,
}

impl RunSummary {
    pub fn from_stories(stories: &[Story], iterations: u32, started_at: DateTime<Utc>) -> Self {
        let mut counts = BTreeMap::new();
        let mut done = Vec::new();
        let mut blocked = Vec::new();
        let mut pending = Vec::new();

        for story in stories {
            *counts.entry(story.status.as_str().to_string()).or_insert(0) += 1;
            let bucket = if story.status.is_done() {
                &mut done
            } else if story.status.is_blocked() {
                &mut blocked
            } else {
                &mut pending
            };
            bucket.push(story.id.clone());
        }

        Self {
            started_at,
            finished_at: Utc::now(),
            iterations,
            total: stories.len(),
            counts,
            done,
            blocked,
            pending,
        }
    }

    pub fn count(&self, status: StoryStatus) -> usize {
        self.counts.get(status.as_str()).copied().unwrap_or(0)
    }

    /// Short multi-line text for the notes journal and the CLI.
    pub fn render(&self) -> String {
        let counts = self
            .counts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Run summary: {} iteration(s), {} stories ({counts})\n- done: {}\n- blocked: {}\n- pending: {}",
            self.iterations,
            self.total,
            join_or_dash(&self.done),
            join_or_dash(&self.blocked),
            join_or_dash(&self.pending),
        )
    }
}

fn join_or_dash(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}

/// Write `<artifacts>/runs/<YYYYmmdd-HHMMSS>/summary.json`.
pub fn write_run_summary(summary: &RunSummary, artifacts: &Path) -> Result<PathBuf, ReportError> {
    let dir = artifacts
        .join("runs")
        .join(summary.started_at.format("%Y%m%d-%H%M%S").to_string());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("summary.json");
    std::fs::write(&path, serde_json::to_vec_pretty(summary)?)?;
    Ok(path)
}

/// One timed role invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTiming {
    pub role: String,
    pub executor: String,
    pub story_id: String,
    pub status: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Write `<artifacts>/metrics/<YYYY-mm-dd_HH-MM-SS>.json`. Nothing is written
/// for an empty list.
pub fn write_role_timings(
    timings: &[RoleTiming],
    artifacts: &Path,
    at: DateTime<Utc>,
) -> Result<Option<PathBuf>, ReportError> {
    if timings.is_empty() {
        return Ok(None);
    }
    let dir = artifacts.join("metrics");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", at.format("%Y-%m-%d_%H-%M-%S")));
    std::fs::write(&path, serde_json::to_vec_pretty(timings)?)?;
    Ok(Some(path))
}

/// Artifact directories subject to retention.
const RETAINED_DIRS: &[&str] = &["runs", "dev", "metrics"];

/// Remove entries under `runs/`, `dev/` and `metrics/` last modified more
/// than `retention_days` before now. Returns the removed paths.
pub fn prune_artifacts(artifacts: &Path, retention_days: u32) -> Result<Vec<PathBuf>, ReportError> {
    prune_artifacts_at(artifacts, retention_days, SystemTime::now())
}

pub(crate) fn prune_artifacts_at(
    artifacts: &Path,
    retention_days: u32,
    now: SystemTime,
) -> Result<Vec<PathBuf>, ReportError> {
    let mut removed = Vec::new();
    if retention_days == 0 {
        return Ok(removed);
    }
    let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);

    for name in RETAINED_DIRS {
        let dir = artifacts.join(name);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            let age = now
                .duration_since(meta.modified()?)
                .unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }
            let path = entry.path();
            if meta.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
            removed.push(path);
        }
    }
    Ok(removed)
}
