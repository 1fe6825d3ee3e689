//! The orchestration engine.
//!
//! One [`Orchestrator`] owns one backlog and drives it, a story at a time,
//! through Developer -> QA -> (Architect) cycles. Per-story attempt counters
//! live on the instance and are dropped on every terminal transition.
//!
//! Each iteration, persisting the backlog after every step that decides:
//! 1. architect pre-pass over the first two `in_review` stories
//! 2. select the first `todo` story (none left: stop)
//! 3. Developer; a non-ok result sends the story back or blocks it
//! 4. QA, then classification of any failure
//! 5. architect fast path over stories now `in_review`
//!
//! An iteration whose backlog load was unrecoverable does nothing and never
//! writes over the file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use storyloop_a2a::{Payload, SkillHandler};
use tracing::{info, warn, Instrument};

use crate::classifier::{classify, Severity};
use crate::config::{OrchestratorSettings, PipelineConfig};
use crate::domain::{Priority, QaReport, QaStatus, Result, Story, StoryStatus};
use crate::executor::{build_executor, ExecutionResult, RoleExecutor};
use crate::metrics::METRICS;
use crate::notes::NotesJournal;
use crate::obs;
use crate::reporting::{
    prune_artifacts, write_failure_report, write_role_timings, write_run_summary,
    DevFailureReport, RoleTiming, RunSummary,
};
use crate::roles::Role;
use crate::store::{LoadReport, StoryStore};

/// Architect interventions per pass.
const INTERVENTIONS_PER_PASS: usize = 2;

/// In-process handlers, keyed by role.
pub type HandlerRegistry = HashMap<Role, Arc<dyn SkillHandler>>;

/// Attempt counters for one story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoryAttempts {
    pub dev: u32,
    pub arch: u32,
}

/// How much guidance the architect is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    High,
    Maximum,
    ForceApprove,
}

impl DetailLevel {
    pub fn for_attempt(attempt: u32, force_threshold: u32) -> Self {
        if attempt >= force_threshold {
            DetailLevel::ForceApprove
        } else if attempt <= 1 {
            DetailLevel::High
        } else {
            DetailLevel::Maximum
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::High => "high",
            DetailLevel::Maximum => "maximum",
            DetailLevel::ForceApprove => "force_approve",
        }
    }
}

/// The executors the engine drives.
pub struct RoleExecutors {
    pub architect: RoleExecutor,
    pub developer: RoleExecutor,
    pub qa: RoleExecutor,
}

impl RoleExecutors {
    /// Select each role's executor from config, with `handlers` as the local side.
    pub fn from_config(config: &PipelineConfig, handlers: &HandlerRegistry) -> Self {
        let build = |role: Role| build_executor(role, handlers.get(&role).cloned(), &config.a2a);
        Self {
            architect: build(Role::Architect),
            developer: build(Role::Developer),
            qa: build(Role::Qa),
        }
    }

    pub fn get(&self, role: Role) -> Option<&RoleExecutor> {
        match role {
            Role::Architect => Some(&self.architect),
            Role::Developer => Some(&self.developer),
            Role::Qa => Some(&self.qa),
            _ => None,
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No `todo` story was left.
    Idle,
    Worked { story_id: String, status: StoryStatus },
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    store: StoryStore,
    notes: NotesJournal,
    artifacts: PathBuf,
    executors: RoleExecutors,
    attempts: HashMap<String, StoryAttempts>,
    timings: Vec<RoleTiming>,
    /// Backlog as of the last iteration, for the run summary.
    snapshot: Option<Vec<Story>>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        store: StoryStore,
        notes: NotesJournal,
        artifacts: impl Into<PathBuf>,
        executors: RoleExecutors,
    ) -> Self {
        Self {
            settings,
            store,
            notes,
            artifacts: artifacts.into(),
            executors,
            attempts: HashMap::new(),
            timings: Vec::new(),
            snapshot: None,
        }
    }

    /// Wire store, journal and executors from a loaded config.
    pub fn from_config(config: &PipelineConfig, handlers: &HandlerRegistry) -> Self {
        let notes = NotesJournal::new(&config.paths.notes);
        let store = StoryStore::new(&config.paths.stories).with_notes(notes.clone());
        Self::new(
            config.orchestrator.clone(),
            store,
            notes,
            &config.paths.artifacts,
            RoleExecutors::from_config(config, handlers),
        )
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Current counters for `story_id`; `None` once cleared.
    pub fn attempts(&self, story_id: &str) -> Option<StoryAttempts> {
        self.attempts.get(story_id).copied()
    }

    /// Run up to `max_loops` iterations, stopping early once nothing is `todo`.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let mut iterations = 0;
        info!(
            max_loops = self.settings.max_loops,
            executors = %format!(
                "architect={} developer={} qa={}",
                self.executors.architect.kind(),
                self.executors.developer.kind(),
                self.executors.qa.kind()
            ),
            "orchestrator starting"
        );
        self.prune_old_artifacts();

        for iteration in 1..=self.settings.max_loops {
            iterations = iteration;
            METRICS.inc_iterations();
            if self.run_iteration(iteration).await? == IterationOutcome::Idle {
                info!(iteration, "no todo stories left");
                break;
            }
        }

        let stories = match self.snapshot.take() {
            Some(stories) => stories,
            None => self.store.load(),
        };
        let summary = RunSummary::from_stories(&stories, iterations, started_at);
        match write_run_summary(&summary, &self.artifacts) {
            Ok(path) => info!(path = %path.display(), "run summary written"),
            Err(err) => warn!(error = %err, "failed to write run summary"),
        }
        let timings = std::mem::take(&mut self.timings);
        match write_role_timings(&timings, &self.artifacts, summary.finished_at) {
            Ok(Some(path)) => {
                info!(path = %path.display(), invocations = timings.len(), "role timings written")
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to write role timings"),
        }
        self.notes.append(&summary.render());
        METRICS.flush();
        Ok(summary)
    }

    /// One pass of the state machine.
    pub async fn run_iteration(&mut self, iteration: u32) -> Result<IterationOutcome> {
        self.iterate(iteration)
            .instrument(obs::iteration_span(iteration))
            .await
    }

    async fn iterate(&mut self, iteration: u32) -> Result<IterationOutcome> {
        obs::emit_iteration_started(iteration, self.settings.max_loops);
        let start = Instant::now();

        let loaded = self.store.load_detailed();
        if let LoadReport::Unrecoverable { error, .. } = &loaded.report {
            warn!(error = %error, "backlog unreadable; iteration skipped");
            self.snapshot = Some(Vec::new());
            obs::emit_iteration_finished(iteration, None, start.elapsed().as_millis() as u64);
            return Ok(IterationOutcome::Idle);
        }
        let mut stories = loaded.stories;

        if self.settings.architect_intervention {
            self.architect_pass(&mut stories).await;
            self.save(&stories)?;
        }

        let Some(idx) = stories.iter().position(|s| s.status == StoryStatus::Todo) else {
            self.snapshot = Some(stories);
            obs::emit_iteration_finished(iteration, None, start.elapsed().as_millis() as u64);
            return Ok(IterationOutcome::Idle);
        };
        let story_id = stories[idx].id.clone();

        let qa_due = self.develop(&mut stories, idx).await;
        self.save(&stories)?;
        if qa_due {
            self.quality_check(&mut stories, idx).await;
            self.save(&stories)?;
            if self.settings.architect_intervention {
                self.architect_pass(&mut stories).await;
                self.save(&stories)?;
            }
        }

        let status = stories
            .iter()
            .find(|s| s.id == story_id)
            .map(|s| s.status)
            .unwrap_or_default();
        obs::emit_iteration_finished(
            iteration,
            Some(&story_id),
            start.elapsed().as_millis() as u64,
        );
        Ok(IterationOutcome::Worked { story_id, status })
    }

    /// Architect review of the first `in_review` stories.
    async fn architect_pass(&mut self, stories: &mut [Story]) {
        let targets: Vec<usize> = stories
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == StoryStatus::InReview)
            .map(|(i, _)| i)
            .take(INTERVENTIONS_PER_PASS)
            .collect();

        for idx in targets {
            let story_id = stories[idx].id.clone();
            let counters = self.attempts.entry(story_id.clone()).or_default();
            counters.arch += 1;
            let attempt = counters.arch;
            let level = DetailLevel::for_attempt(attempt, self.settings.force_approval_attempts);

            let result = self
                .invoke(
                    Role::Architect,
                    &story_id,
                    json!({
                        "story_id": story_id,
                        "detail_level": level.as_str(),
                        "iteration_count": attempt,
                        "mode": "review_adjustment",
                    }),
                )
                .await;

            if !result.is_ok() {
                self.notes.append(&format!(
                    "Architect intervention on {story_id} failed (attempt {attempt}): {}",
                    failure_text(&result)
                ));
                continue;
            }

            if attempt >= self.settings.force_approval_attempts && stories[idx].is_high_priority() {
                self.complete(
                    stories,
                    idx,
                    StoryStatus::DoneForceArchitect,
                    &format!("architect force-approved after {attempt} interventions"),
                );
            } else {
                self.transition(
                    &mut stories[idx],
                    StoryStatus::Todo,
                    &format!("architect adjusted criteria ({} detail, attempt {attempt})", level.as_str()),
                );
                // back with the developer: interventions start over
                if let Some(counters) = self.attempts.get_mut(&story_id) {
                    counters.arch = 0;
                }
            }
        }
    }

    /// Developer step. Returns whether QA should run.
    async fn develop(&mut self, stories: &mut [Story], idx: usize) -> bool {
        let story_id = stories[idx].id.clone();
        let counters = self.attempts.entry(story_id.clone()).or_default();
        counters.dev += 1;
        let attempt = counters.dev;

        let result = self
            .invoke(
                Role::Developer,
                &story_id,
                json!({"story_id": story_id, "attempt": attempt}),
            )
            .await;

        if result.is_ok() {
            return true;
        }

        if attempt >= self.settings.dev_retry_attempts {
            let reason = format!(
                "developer failed {attempt} time(s): {}",
                failure_text(&result)
            );
            self.transition(&mut stories[idx], StoryStatus::BlockedDev, &reason);
            let report = DevFailureReport {
                story_id: story_id.clone(),
                attempts: attempt,
                reason,
                last_result: result.into_map(),
                recorded_at: Utc::now(),
            };
            match write_failure_report(&report, &self.artifacts) {
                Ok(path) => self.notes.append(&format!(
                    "Failure report for {story_id}: {}",
                    path.display()
                )),
                Err(err) => warn!(story_id = %story_id, error = %err, "failed to write failure report"),
            }
        } else {
            self.transition(
                &mut stories[idx],
                StoryStatus::InReview,
                &format!("developer attempt {attempt} failed: {}", failure_text(&result)),
            );
        }
        false
    }

    /// QA step and the status decision that follows it.
    async fn quality_check(&mut self, stories: &mut Vec<Story>, idx: usize) {
        let story_id = stories[idx].id.clone();
        let allow_no_tests = self.settings.allow_no_tests;
        let result = self
            .invoke(
                Role::Qa,
                &story_id,
                json!({"story_id": story_id, "allow_no_tests": allow_no_tests}),
            )
            .await;
        let report = QaReport::from_result(result.as_map());

        match report.status {
            QaStatus::Pass => self.complete(stories, idx, StoryStatus::Done, "QA passed"),
            QaStatus::NoTests if report.area_passed("backend") => self.complete(
                stories,
                idx,
                StoryStatus::Done,
                "backend tests pass; remaining areas have no tests",
            ),
            QaStatus::NoTests if !allow_no_tests => self.transition(
                &mut stories[idx],
                StoryStatus::BlockedNoTests,
                "QA found no tests and no-tests is not allowed",
            ),
            QaStatus::NoTests => {
                let target = self.settings.status_for_no_tests;
                self.transition(&mut stories[idx], target, "QA found no tests");
                if self.settings.create_test_story {
                    self.spawn_test_story(stories, idx);
                }
            }
            QaStatus::Fail | QaStatus::BlockedFatal | QaStatus::Unknown => {
                let retry_count = self.attempts(&story_id).map(|a| a.dev).unwrap_or(0);
                let verdict = classify(&report.failure_details, retry_count);
                let reason = format!("QA {}: {}", verdict.severity, verdict.details);
                match verdict.severity {
                    Severity::BlockedFatal => {
                        self.transition(&mut stories[idx], StoryStatus::BlockedFatal, &reason)
                    }
                    Severity::ForceApplicable => {
                        let counters = self.attempts.entry(story_id.clone()).or_default();
                        counters.arch += 1;
                        let arch = counters.arch;
                        if arch >= self.settings.force_approval_attempts
                            && stories[idx].is_high_priority()
                        {
                            self.complete(stories, idx, StoryStatus::DoneForceArchitect, &reason);
                        } else {
                            self.transition(&mut stories[idx], StoryStatus::InReview, &reason);
                        }
                    }
                    Severity::TestOnly => {
                        self.transition(&mut stories[idx], StoryStatus::InReviewTests, &reason)
                    }
                    Severity::Persistent if retry_count >= self.settings.dev_retry_attempts => self
                        .transition(
                            &mut stories[idx],
                            StoryStatus::BlockedQualityIssues,
                            &reason,
                        ),
                    Severity::Persistent => {
                        self.transition(&mut stories[idx], StoryStatus::InReviewRetry, &reason)
                    }
                    Severity::Standard => {
                        self.transition(&mut stories[idx], StoryStatus::InReview, &reason)
                    }
                }
            }
        }
    }

    /// Append `<id>-TESTS` for a story that shipped without tests, once.
    fn spawn_test_story(&mut self, stories: &mut Vec<Story>, idx: usize) {
        let parent = &stories[idx];
        let child_id = format!("{}-TESTS", parent.id);
        if stories.iter().any(|s| s.id == child_id) {
            return;
        }

        let mut child = Story::new(&child_id)
            .with_description(format!(
                "Write automated tests for {}: {}",
                parent.id,
                parent.description.as_deref().unwrap_or_default()
            ))
            .with_priority(parent.priority.unwrap_or(Priority::P2));
        child.acceptance = vec!["Run the test runners and get exit code 0.".to_string()];
        child.extra.insert(
            "epic".into(),
            parent.extra_str("epic").unwrap_or("E1").into(),
        );

        self.notes
            .append(&format!("Created {child_id} to add tests for {}", parent.id));
        info!(story_id = %child_id, "test story created");
        stories.push(child);
    }

    /// Close a story successfully and wake every `quality_gate_waiting` story.
    fn complete(&mut self, stories: &mut [Story], idx: usize, status: StoryStatus, reason: &str) {
        self.transition(&mut stories[idx], status, reason);
        let completed = stories[idx].id.clone();
        for story in stories
            .iter_mut()
            .filter(|s| s.status == StoryStatus::QualityGateWaiting)
        {
            self.transition(
                story,
                StoryStatus::Todo,
                &format!("re-activated after {completed} completed"),
            );
        }
    }

    fn transition(&mut self, story: &mut Story, to: StoryStatus, reason: &str) {
        let from = story.status;
        story.status = to;
        obs::emit_story_transition(&story.id, from, to, reason);
        self.notes
            .append(&format!("{}: {from} -> {to} ({reason})", story.id));

        if to.is_terminal() {
            self.attempts.remove(&story.id);
            if to == StoryStatus::DoneForceArchitect {
                METRICS.inc_force_approvals();
            }
            if to.is_done() {
                METRICS.inc_stories_done();
            } else {
                METRICS.inc_stories_blocked();
            }
        }
    }

    /// Run `role` on `body`, timing the call.
    async fn invoke(&mut self, role: Role, story_id: &str, body: Value) -> ExecutionResult {
        let Some(executor) = self.executors.get(role) else {
            return ExecutionResult::error(format!("no executor for role '{role}'"));
        };
        let start = Instant::now();
        let result = executor.execute(payload(body)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        obs::emit_role_invoked(
            role.as_str(),
            executor.kind(),
            story_id,
            result.status_str(),
            duration_ms,
        );
        self.timings.push(RoleTiming {
            role: role.as_str().to_string(),
            executor: executor.kind().to_string(),
            story_id: story_id.to_string(),
            status: result.status_str().to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });
        result
    }

    fn save(&mut self, stories: &[Story]) -> Result<()> {
        self.store.persist(stories)?;
        self.snapshot = Some(stories.to_vec());
        Ok(())
    }

    fn prune_old_artifacts(&self) {
        let days = self.settings.artifact_retention_days;
        match prune_artifacts(&self.artifacts, days) {
            Ok(removed) if !removed.is_empty() => obs::emit_artifacts_pruned(removed.len(), days),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "artifact pruning failed"),
        }
    }
}

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn failure_text(result: &ExecutionResult) -> String {
    match result.error_message() {
        Some(err) => format!("{} ({err})", result.status_str()),
        None => result.status_str().to_string(),
    }
}
