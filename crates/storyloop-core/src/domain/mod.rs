//! Domain models for storyloop.
//!
//! - `Story`: a backlog work item and its workflow status
//! - `QaReport`: the QA role's verdict for one story
//! - error taxonomy shared by the core crate

pub mod error;
pub mod qa_report;
pub mod story;

pub use error::{ConfigError, ReportError, Result, StoreError, StoryloopError};
pub use qa_report::{AreaFailures, AreaResult, QaReport, QaStatus, TestError};
pub use story::{Estimate, Priority, Story, StoryStatus};
