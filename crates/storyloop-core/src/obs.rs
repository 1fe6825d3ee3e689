//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Iteration-scoped tracing spans via `iteration_span`
//! - Emission functions for key lifecycle events: iteration start/finish,
//!   story transitions, timed role invocations, executor fallbacks, backlog
//!   repair, artifact pruning
//!
//! Events are emitted at `info!` level (configurable via `STORYLOOP_LOG`).

use std::path::Path;

use tracing::{error, info, warn};

use crate::domain::StoryStatus;

/// Span for one engine iteration; attach it with `tracing::Instrument`.
///
/// ```ignore
/// work.instrument(iteration_span(3)).await
/// // everything logged inside carries iteration = 3
/// ```
pub fn iteration_span(iteration: u32) -> tracing::Span {
    tracing::info_span!("storyloop.iteration", iteration = iteration)
}

pub fn emit_iteration_started(iteration: u32, max_loops: u32) {
    info!(event = "iteration.started", iteration = iteration, max_loops = max_loops);
}

/// Emit event: iteration finished, with the story it worked on (if any).
pub fn emit_iteration_finished(iteration: u32, story_id: Option<&str>, duration_ms: u64) {
    info!(
        event = "iteration.finished",
        iteration = iteration,
        story_id = story_id.unwrap_or("-"),
        duration_ms = duration_ms,
    );
}

/// Emit event: a story changed status.
pub fn emit_story_transition(story_id: &str, from: StoryStatus, to: StoryStatus, reason: &str) {
    info!(
        event = "story.transition",
        story_id = %story_id,
        from = %from,
        to = %to,
        reason = %reason,
    );
}

pub fn emit_role_invoked(role: &str, executor: &str, story_id: &str, status: &str, duration_ms: u64) {
    info!(
        event = "role.invoked",
        role = %role,
        executor = %executor,
        story_id = %story_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

pub fn emit_artifacts_pruned(removed: usize, retention_days: u32) {
    info!(event = "artifacts.pruned", removed = removed, retention_days = retention_days);
}

/// Emit event: a remote executor fell back to local execution (warning level).
pub fn emit_executor_fallback(role: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "executor.fallback", role = %role, reason = %reason);
}

pub fn emit_backlog_repaired(path: &Path, passes: &[&str]) {
    info!(event = "backlog.repaired", path = %path.display(), passes = ?passes);
}

/// Emit event: the backlog could not be recovered (error level).
pub fn emit_backlog_fatal(path: &Path, error: &dyn std::fmt::Display) {
    error!(event = "backlog.fatal", path = %path.display(), error = %error);
}
