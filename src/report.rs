use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single analysis dimension. Closed set; callers are expected
/// to match exhaustively instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Good,
    Warn,
    Bad,
    Info,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckStatus::Good => "good",
            CheckStatus::Warn => "warn",
            CheckStatus::Bad => "bad",
            CheckStatus::Info => "info",
        };
        f.write_str(s)
    }
}

/// Atomic unit of evidence in a report. One check per analysis dimension,
/// always emitted even when the dimension is inconclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub key: String,
    pub label: String,
    pub status: CheckStatus,
    pub details: String,
}

impl Check {
    pub fn new(key: &str, label: &str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            status,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Clean,
    Suspicious,
    Malicious,
}

impl Classification {
    /// Thresholds: < 40 clean, 40..=69 suspicious, >= 70 malicious.
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            Classification::Malicious
        } else if score >= 40 {
            Classification::Suspicious
        } else {
            Classification::Clean
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Clean => "clean",
            Classification::Suspicious => "suspicious",
            Classification::Malicious => "malicious",
        };
        f.write_str(s)
    }
}

/// Headline fields surfaced to UIs without digging through the checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub from: String,
    pub return_path: String,
    pub spf: String,
    pub dkim: String,
    pub dmarc: String,
}

/// Final artifact of one analysis invocation. Immutable once assembled;
/// body-score fusion produces a new Report and leaves the header-only
/// score in `header_score` for audit.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub score: u32,
    pub classification: Classification,
    pub header_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_verdict: Option<String>,
    pub checks: Vec<Check>,
    pub summary: Summary,
    pub raw: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Look up a check by its key. Checks keep the canonical dimension
    /// order, so positional indexing also works for known layouts.
    pub fn check(&self, key: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.key == key)
    }
}
