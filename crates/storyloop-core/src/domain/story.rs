//! Backlog stories and their workflow vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::domain::error::ConfigError;

/// Workflow status of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoryStatus {
    #[default]
    Todo,
    InReview,
    InReviewTests,
    InReviewRetry,
    QualityGateWaiting,
    BlockedDev,
    BlockedNoTests,
    BlockedFatal,
    BlockedQualityIssues,
    Done,
    DoneForceArchitect,
}

impl StoryStatus {
    pub const ALL: [StoryStatus; 11] = [
        StoryStatus::Todo,
        StoryStatus::InReview,
        StoryStatus::InReviewTests,
        StoryStatus::InReviewRetry,
        StoryStatus::QualityGateWaiting,
        StoryStatus::BlockedDev,
        StoryStatus::BlockedNoTests,
        StoryStatus::BlockedFatal,
        StoryStatus::BlockedQualityIssues,
        StoryStatus::Done,
        StoryStatus::DoneForceArchitect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Todo => "todo",
            StoryStatus::InReview => "in_review",
            StoryStatus::InReviewTests => "in_review_tests",
            StoryStatus::InReviewRetry => "in_review_retry",
            StoryStatus::QualityGateWaiting => "quality_gate_waiting",
            StoryStatus::BlockedDev => "blocked_dev",
            StoryStatus::BlockedNoTests => "blocked_no_tests",
            StoryStatus::BlockedFatal => "blocked_fatal",
            StoryStatus::BlockedQualityIssues => "blocked_quality_issues",
            StoryStatus::Done => "done",
            StoryStatus::DoneForceArchitect => "done_force_architect",
        }
    }

    /// Terminal stories are never scheduled again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StoryStatus::Done
                | StoryStatus::DoneForceArchitect
                | StoryStatus::BlockedDev
                | StoryStatus::BlockedNoTests
                | StoryStatus::BlockedFatal
                | StoryStatus::BlockedQualityIssues
        )
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StoryStatus::Done | StoryStatus::DoneForceArchitect)
    }

    pub fn is_blocked(&self) -> bool {
        self.is_terminal() && !self.is_done()
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = ConfigError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        StoryStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownStatus(s.to_string()))
    }
}

/// Serialize through `as_str` and parse through `FromStr`.
macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(StoryStatus);
string_serde!(Priority);
string_serde!(Estimate);

/// Story priority, P0 being the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }

    /// P0 and P1 stories may be force-approved by the architect.
    pub fn is_high(&self) -> bool {
        matches!(self, Priority::P0 | Priority::P1)
    }
}

impl FromStr for Priority {
    type Err = ConfigError;

    /// Case-insensitive, so `p1` is `P1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownPriority(s.to_string()))
    }
}

/// T-shirt size estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Estimate {
    XS,
    S,
    M,
    L,
    XL,
}

impl Estimate {
    pub const ALL: [Estimate; 5] = [Estimate::XS, Estimate::S, Estimate::M, Estimate::L, Estimate::XL];

    pub fn as_str(&self) -> &'static str {
        match self {
            Estimate::XS => "XS",
            Estimate::S => "S",
            Estimate::M => "M",
            Estimate::L => "L",
            Estimate::XL => "XL",
        }
    }
}

impl FromStr for Estimate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Estimate::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownEstimate(s.to_string()))
    }
}

/// A backlog work item.
///
/// Keys the pipeline does not model (for example `epic`) are kept in
/// [`Story::extra`] and written back after the known keys, in their
/// original order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<Estimate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Story {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            acceptance: Vec::new(),
            status: StoryStatus::Todo,
            priority: None,
            estimate: None,
            depends_on: Vec::new(),
            extra: Mapping::new(),
        }
    }

    pub fn with_status(mut self, status: StoryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority.map(|p| p.is_high()).unwrap_or(false)
    }

    /// String value of an unmodelled key, such as `epic`.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(YamlValue::as_str)
    }
}

/// Accept `acceptance` as either a single string or a list of strings.
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(items) => items,
        OneOrMany::Null(()) => Vec::new(),
    })
}
