//! storyloop core library
//!
//! Backlog store, role executors and the orchestration engine that drives
//! stories through Developer -> QA -> Architect cycles.

pub mod classifier;
pub mod command_handler;
pub mod config;
pub mod domain;
pub mod executor;
pub mod metrics;
pub mod notes;
pub mod obs;
pub mod orchestrator;
pub mod reporting;
pub mod roles;
pub mod self_healing;
pub mod store;
pub mod telemetry;

pub use classifier::{classify, BucketCounts, Classification, ErrorBucket, Severity};
pub use command_handler::{registry_from_config, CommandHandler};
pub use config::{
    A2aSettings, AgentDefinition, ExecutionStrategy, HandlerSettings, OrchestratorSettings,
    PathSettings, PipelineConfig,
};
pub use domain::{
    AreaFailures, AreaResult, ConfigError, Estimate, Priority, QaReport, QaStatus, ReportError,
    Result, StoreError, Story, StoryStatus, StoryloopError, TestError,
};
pub use executor::{
    build_executor, ExecutionResult, ExecutionStatus, LocalExecutor, RemoteExecutor, RoleExecutor,
};
pub use notes::NotesJournal;
pub use orchestrator::{
    DetailLevel, HandlerRegistry, IterationOutcome, Orchestrator, RoleExecutors, StoryAttempts,
};
pub use reporting::{
    prune_artifacts, read_failure_report, write_failure_report, write_role_timings,
    write_run_summary, DevFailureReport, RoleTiming, RunSummary,
};
pub use roles::Role;
pub use store::{LoadReport, LoadedBacklog, ParsedBacklog, ReopenSummary, SalvagedField, StoryStore};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// storyloop version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
