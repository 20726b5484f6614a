//! Data models for the analysis cache.
//!
//! This module contains the records persisted per repository and the
//! typed repository identifier accepted at the HTTP boundary.

use crate::error::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository on the hosting service, in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Build an identifier from its two segments, validating both.
    pub fn new(owner: &str, name: &str) -> Result<Self> {
        validate_segment(owner)?;
        validate_segment(name)?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse an `owner/name` string.
    #[cfg(test)]
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, name)) => Self::new(owner, name),
            None => Err(Error::InvalidArgument(format!(
                "repository identifier must be owner/name, got {:?}",
                s
            ))),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store key for this repository, e.g. `github.com/owner/name`.
    pub fn canonical_url(&self, host: &str) -> String {
        format!("{}/{}/{}", host.trim_end_matches('/'), self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Segments end up as directory names under the workspace root.
fn validate_segment(segment: &str) -> Result<()> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "invalid repository segment: {:?}",
            segment
        )))
    }
}

/// One issue reported by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Human-readable description.
    pub message: String,
    /// Path relative to the repository root.
    pub file: String,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, 0 when the tool gives none).
    pub column: u32,
}

/// One completed analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Revision the run analyzed; the cache key.
    pub hash: String,
    /// Completion time, stored as Unix seconds.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Findings in the order the analyzer reported them.
    pub findings: Vec<Finding>,
}

impl AnalysisRecord {
    /// Create a record stamped with the current time.
    ///
    /// The timestamp is truncated to whole seconds so the value survives
    /// a store round-trip unchanged.
    pub fn completed_now(hash: String, findings: Vec<Finding>) -> Self {
        Self {
            hash,
            timestamp: Utc::now().trunc_subsecs(0),
            findings,
        }
    }
}

/// A repository and its analysis history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Canonical URL, unique across the store.
    pub url: String,
    /// Most recent analysis first.
    #[serde(default)]
    pub analysis: Vec<AnalysisRecord>,
    /// Language/ecosystem tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RepositoryRecord {
    /// Creates a record with empty history.
    pub fn new(url: String, language: Option<String>) -> Self {
        Self {
            url,
            analysis: Vec::new(),
            language,
        }
    }

    /// The authoritative result, if any run has completed.
    pub fn current(&self) -> Option<&AnalysisRecord> {
        self.analysis.first()
    }

    /// Whether the current analysis was computed for `revision`.
    pub fn is_current_for(&self, revision: &str) -> bool {
        self.current().is_some_and(|a| a.hash == revision)
    }

    /// Record a new run as the current one.
    pub fn push_analysis(&mut self, analysis: AnalysisRecord) {
        self.analysis.insert(0, analysis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(hash: &str) -> AnalysisRecord {
        AnalysisRecord::completed_now(hash.to_string(), Vec::new())
    }

    #[test]
    fn test_parse_repo_id() {
        let id = RepoId::parse("octo/sample").unwrap();
        assert_eq!(id.owner(), "octo");
        assert_eq!(id.name(), "sample");
        assert_eq!(id.to_string(), "octo/sample");
        assert_eq!(id.canonical_url("github.com"), "github.com/octo/sample");
    }

    #[test]
    fn test_parse_repo_id_rejects_traversal() {
        assert!(RepoId::parse("../etc").is_err());
        assert!(RepoId::parse("octo/..").is_err());
        assert!(RepoId::parse("octo").is_err());
        assert!(RepoId::parse("octo/a/b").is_err());
        assert!(RepoId::new("", "sample").is_err());
        assert!(RepoId::new("octo", "sam ple").is_err());
    }

    #[test]
    fn test_repo_id_allows_dots_and_dashes() {
        assert!(RepoId::new("rust-lang", "rust.vim").is_ok());
        assert!(RepoId::new("a_b", "c-d.e").is_ok());
    }

    #[test]
    fn test_push_analysis_prepends() {
        let mut record = RepositoryRecord::new("github.com/octo/sample".into(), None);
        assert!(record.current().is_none());
        assert!(!record.is_current_for("abc"));

        record.push_analysis(analysis("h1"));
        record.push_analysis(analysis("h2"));

        assert_eq!(record.analysis.len(), 2);
        assert_eq!(record.current().unwrap().hash, "h2");
        assert!(record.is_current_for("h2"));
        assert!(!record.is_current_for("h1"));
    }

    #[test]
    fn test_json_shape() {
        let mut record = RepositoryRecord::new("github.com/octo/sample".into(), None);
        record.push_analysis(AnalysisRecord {
            hash: "abc123".into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            findings: vec![Finding {
                message: "unused import".into(),
                file: "main.go".into(),
                line: 4,
                column: 2,
            }],
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "github.com/octo/sample",
                "analysis": [{
                    "hash": "abc123",
                    "timestamp": 1_700_000_000,
                    "findings": [{
                        "message": "unused import",
                        "file": "main.go",
                        "line": 4,
                        "column": 2
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_completed_now_round_trips() {
        let record = analysis("abc");
        let json = serde_json::to_string(&record).unwrap();
        let back: AnalysisRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
