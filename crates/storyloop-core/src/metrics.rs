//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    iterations: AtomicU64,
    stories_done: AtomicU64,
    stories_blocked: AtomicU64,
    remote_fallbacks: AtomicU64,
    force_approvals: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            stories_done: AtomicU64::new(0),
            stories_blocked: AtomicU64::new(0),
            remote_fallbacks: AtomicU64::new(0),
            force_approvals: AtomicU64::new(0),
        }
    }

    pub fn inc_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "iterations", "counter incremented");
    }

    pub fn inc_stories_done(&self) {
        self.stories_done.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stories_done", "counter incremented");
    }

    pub fn inc_stories_blocked(&self) {
        self.stories_blocked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stories_blocked", "counter incremented");
    }

    /// A remote executor served a call from its local fallback.
    pub fn inc_remote_fallbacks(&self) {
        self.remote_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "remote_fallbacks", "counter incremented");
    }

    /// A story was closed as `done_force_architect`.
    pub fn inc_force_approvals(&self) {
        self.force_approvals.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "force_approvals", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            iterations = self.iterations(),
            stories_done = self.stories_done(),
            stories_blocked = self.stories_blocked(),
            remote_fallbacks = self.remote_fallbacks(),
            force_approvals = self.force_approvals(),
        );
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn stories_done(&self) -> u64 {
        self.stories_done.load(Ordering::Relaxed)
    }

    pub fn stories_blocked(&self) -> u64 {
        self.stories_blocked.load(Ordering::Relaxed)
    }

    pub fn remote_fallbacks(&self) -> u64 {
        self.remote_fallbacks.load(Ordering::Relaxed)
    }

    pub fn force_approvals(&self) -> u64 {
        self.force_approvals.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_iterations();
        m.inc_iterations();
        assert_eq!(m.iterations(), 2);

        m.inc_remote_fallbacks();
        assert_eq!(m.remote_fallbacks(), 1);

        m.inc_force_approvals();
        m.inc_stories_done();
        m.inc_stories_blocked();
        assert_eq!(m.force_approvals(), 1);
        assert_eq!(m.stories_done(), 1);
        assert_eq!(m.stories_blocked(), 1);
    }
}
