//! QA failure classification.
//!
//! Every error in a QA report is sorted into one bucket by its `type`
//! tokens and whole-word patterns in its message. The bucket counts then decide a single
//! severity for the story.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{AreaFailures, TestError};

/// Bucket a single test error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorBucket {
    /// The suite cannot run at all: missing tool, syntax, imports, collection.
    Critical,
    /// Tooling or environment problems an architect may waive.
    ForceApplicable,
    Other,
}

/// Severity decided for a failed QA run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    BlockedFatal,
    ForceApplicable,
    TestOnly,
    Persistent,
    Standard,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::BlockedFatal => "blocked_fatal",
            Severity::ForceApplicable => "force_applicable",
            Severity::TestOnly => "test_only",
            Severity::Persistent => "persistent",
            Severity::Standard => "standard",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub critical: usize,
    pub force_applicable: usize,
    pub other: usize,
}

impl BucketCounts {
    pub fn total(&self) -> usize {
        self.critical + self.force_applicable + self.other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub severity: Severity,
    pub details: String,
    pub counts: BucketCounts,
}

/// `type` tokens (split on `_`, `-` and spaces) that mark a critical error.
const CRITICAL_TYPE_TOKENS: &[&str] = &[
    "collection",
    "syntax",
    "syntaxerror",
    "import",
    "importerror",
    "modulenotfound",
    "modulenotfounderror",
    "executable",
];

const FORCE_APPLICABLE_TYPE_TOKENS: &[&str] =
    &["coverage", "timeout", "environment", "setup", "framework"];

/// Whole-word patterns over the lowercased message.
fn critical_message() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\b(syntaxerror|indentationerror|importerror|modulenotfounderror)\b",
            r"|\bsyntax error\b",
            r"|\bno module named\b",
            r"|\bcannot find module\b",
            r"|\bcommand not found\b",
            r"|\bexecutable not found\b",
            r"|\berror collecting\b",
            r"|\bcollection error\b",
            r"|\brc=127\b",
        ))
        .expect("static regex")
    })
}

fn force_applicable_message() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\bcoverage\b",
            r"|\btimed out\b",
            r"|\btimeout(error)?\b",
            r"|\btest framework\b",
            r"|\benvironment error\b",
            r"|\bsetup (error|failed)\b",
            r"|\berror (at|in|during) setup\b",
        ))
        .expect("static regex")
    })
}

fn type_tokens(kind: &str) -> Vec<String> {
    kind.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sort one error into its bucket.
///
/// The `type` field is matched token by token, the message by whole words.
/// Critical matches win over force-applicable ones.
pub fn bucket_for(error: &TestError) -> ErrorBucket {
    let tokens = type_tokens(&error.kind);
    let has_token = |set: &[&str]| tokens.iter().any(|t| set.contains(&t.as_str()));
    let message = error.error.to_lowercase();

    if has_token(CRITICAL_TYPE_TOKENS) || critical_message().is_match(&message) {
        return ErrorBucket::Critical;
    }
    if has_token(FORCE_APPLICABLE_TYPE_TOKENS) || force_applicable_message().is_match(&message) {
        return ErrorBucket::ForceApplicable;
    }
    ErrorBucket::Other
}

/// Classify the failure details of a QA report.
///
/// `retry_count` is the number of developer attempts made on the story so far.
pub fn classify(failure_details: &BTreeMap<String, AreaFailures>, retry_count: u32) -> Classification {
    let mut counts = BucketCounts::default();
    for error in failure_details.values().flat_map(|area| area.errors.iter()) {
        match bucket_for(error) {
            ErrorBucket::Critical => counts.critical += 1,
            ErrorBucket::ForceApplicable => counts.force_applicable += 1,
            ErrorBucket::Other => counts.other += 1,
        }
    }

    let (severity, details) = if counts.critical > 0 {
        (
            Severity::BlockedFatal,
            format!("{} critical error(s): suite cannot run", counts.critical),
        )
    } else if counts.force_applicable > 0 {
        (
            Severity::ForceApplicable,
            format!(
                "{} tooling/environment error(s); architect may force approval",
                counts.force_applicable
            ),
        )
    } else if counts.other > 0 {
        (
            Severity::TestOnly,
            format!("{} failing test(s)", counts.other),
        )
    } else if retry_count >= 2 {
        (
            Severity::Persistent,
            format!("failure persists after {retry_count} attempts"),
        )
    } else {
        (Severity::Standard, "failure without error details".to_string())
    };

    Classification {
        severity,
        details,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(areas: &[(&str, Vec<TestError>)]) -> BTreeMap<String, AreaFailures> {
        areas
            .iter()
            .map(|(name, errors)| {
                (
                    name.to_string(),
                    AreaFailures {
                        errors: errors.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn bucket_keywords() {
        assert_eq!(
            bucket_for(&TestError::new("pytest_error", "ModuleNotFoundError: No module named 'app'")),
            ErrorBucket::Critical
        );
        assert_eq!(
            bucket_for(&TestError::new("jest_failure", "Cannot find module './cart'")),
            ErrorBucket::Critical
        );
        assert_eq!(
            bucket_for(&TestError::new("missing_coverage", "coverage 40% below 80%")),
            ErrorBucket::ForceApplicable
        );
        assert_eq!(
            bucket_for(&TestError::new("pytest_failure", "Test timed out after 30s")),
            ErrorBucket::ForceApplicable
        );
        assert_eq!(
            bucket_for(&TestError::new("pytest_failure", "assert 2 == 3")),
            ErrorBucket::Other
        );
    }

    #[test]
    fn words_inside_other_words_do_not_match() {
        let cases = [
            TestError::new("assertion", "AssertionError: important flag not set"),
            TestError::new("assertion", "expected the syntax highlighter to be enabled"),
            TestError::new("pytest_failure", "assert reimport_count == 0"),
            TestError::new("pytest_failure", "setup_wizard returned False"),
            TestError::new("pytest_failure", "environment name should be 'staging'"),
            TestError::new("jest_failure", "expected discoverage to equal 3"),
        ];
        for case in &cases {
            assert_eq!(bucket_for(case), ErrorBucket::Other, "{}", case.error);
        }
    }

    #[test]
    fn type_tokens_are_matched_whole() {
        assert_eq!(
            bucket_for(&TestError::new("pytest_collection_error", "")),
            ErrorBucket::Critical
        );
        assert_eq!(
            bucket_for(&TestError::new("missing_executable", "")),
            ErrorBucket::Critical
        );
        assert_eq!(
            bucket_for(&TestError::new("missing_test_framework", "")),
            ErrorBucket::ForceApplicable
        );
        assert_eq!(
            bucket_for(&TestError::new("important_check", "")),
            ErrorBucket::Other
        );
        assert_eq!(
            bucket_for(&TestError::new("pytest_error", "SyntaxError: invalid syntax")),
            ErrorBucket::Critical
        );
        assert_eq!(
            bucket_for(&TestError::new("shell", "sh: 1: vitest: command not found")),
            ErrorBucket::Critical
        );
    }

    #[test]
    fn critical_beats_everything() {
        let d = details(&[
            ("backend", vec![TestError::new("pytest_collection_error", "")]),
            ("web", vec![TestError::new("missing_coverage", "")]),
        ]);
        let c = classify(&d, 0);
        assert_eq!(c.severity, Severity::BlockedFatal);
        assert_eq!(c.counts.critical, 1);
        assert_eq!(c.counts.force_applicable, 1);
    }

    #[test]
    fn force_applicable_beats_test_only() {
        let d = details(&[(
            "backend",
            vec![
                TestError::new("pytest_failure", "assert False"),
                TestError::new("environment", "DATABASE_URL not set"),
            ],
        )]);
        assert_eq!(classify(&d, 0).severity, Severity::ForceApplicable);
    }

    #[test]
    fn plain_failures_are_test_only_regardless_of_retries() {
        let d = details(&[("backend", vec![TestError::new("pytest_failure", "assert 1 == 2")])]);
        assert_eq!(classify(&d, 5).severity, Severity::TestOnly);
    }

    #[test]
    fn no_errors_depends_on_retry_count() {
        let empty = BTreeMap::new();
        assert_eq!(classify(&empty, 1).severity, Severity::Standard);
        assert_eq!(classify(&empty, 2).severity, Severity::Persistent);
        assert_eq!(classify(&empty, 0).counts.total(), 0);
    }
}
