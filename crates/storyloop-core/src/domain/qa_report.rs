//! QA report as produced by the QA role.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Overall QA verdict. Anything unrecognised reads as [`QaStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum QaStatus {
    Pass,
    Fail,
    NoTests,
    BlockedFatal,
    #[default]
    Unknown,
}

impl From<String> for QaStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pass" => QaStatus::Pass,
            "fail" => QaStatus::Fail,
            "no_tests" => QaStatus::NoTests,
            "blocked_fatal" => QaStatus::BlockedFatal,
            _ => QaStatus::Unknown,
        }
    }
}

/// Outcome of one test area (backend, web, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaResult {
    #[serde(default)]
    pub has_tests: bool,
    #[serde(default, alias = "rc")]
    pub return_code: Option<i64>,
}

/// One failing test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl TestError {
    pub fn new(kind: &str, error: &str) -> Self {
        Self {
            test: String::new(),
            error: error.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Failures collected for one area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaFailures {
    #[serde(default)]
    pub errors: Vec<TestError>,
    #[serde(default)]
    pub warnings: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    #[serde(default)]
    pub status: QaStatus,
    #[serde(default)]
    pub areas: BTreeMap<String, AreaResult>,
    #[serde(default)]
    pub failure_details: BTreeMap<String, AreaFailures>,
}

impl QaReport {
    /// Read a report out of a QA execution result.
    ///
    /// A result that does not fit the report shape still yields a report,
    /// with status `unknown`, so the engine can classify it as a failure.
    pub fn from_result(result: &Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(result.clone())).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "malformed QA report");
            QaReport::default()
        })
    }

    /// Whether `area` ran tests that all passed.
    pub fn area_passed(&self, area: &str) -> bool {
        self.areas
            .get(area)
            .map(|a| a.has_tests && a.return_code == Some(0))
            .unwrap_or(false)
    }
}
