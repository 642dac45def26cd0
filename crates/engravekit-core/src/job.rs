//! Engrave request model
//!
//! An [`EngraveRequest`] is created at intake, mutated only by the
//! orchestrator, and frozen once it reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::{Point, Rect};

/// Longest accepted name, in characters, after normalization
pub const MAX_NAME_CHARS: usize = 64;

/// Short unique job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(12);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    /// Live-stream subscription event
    Subscription,
    /// Gifted subscription event
    Gift,
    /// Operator entered a name
    Manual,
    /// Operator test engrave
    Test,
}

impl std::fmt::Display for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSource::Subscription => write!(f, "subscription"),
            JobSource::Gift => write!(f, "gift"),
            JobSource::Manual => write!(f, "manual"),
            JobSource::Test => write!(f, "test"),
        }
    }
}

impl FromStr for JobSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subscription" | "sub" => Ok(JobSource::Subscription),
            "gift" => Ok(JobSource::Gift),
            "manual" => Ok(JobSource::Manual),
            "test" => Ok(JobSource::Test),
            other => Err(Error::validation(format!("unknown source '{}'", other))),
        }
    }
}

/// Lifecycle of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Placed,
    Engraving,
    Done,
    Failed,
}

impl JobStatus {
    /// Statuses that block a new request with the same normalized name
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Placed | JobStatus::Engraving
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Placed => write!(f, "placed"),
            JobStatus::Engraving => write!(f, "engraving"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Placement chosen for a job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobPlacement {
    /// Reserved rectangle on the active surface
    pub rect: Rect,
    /// Text height the name is engraved at
    pub text_height_mm: f64,
    /// Program origin in machine coordinates
    pub origin: Point,
}

/// A single engrave request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngraveRequest {
    pub id: JobId,
    /// Display text, trimmed with whitespace collapsed
    pub name: String,
    /// Deduplication key
    pub normalized_name: String,
    pub source: JobSource,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest time a retry may be dequeued
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last failure reason, kept visible to operators
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub placement: Option<JobPlacement>,
}

impl EngraveRequest {
    /// Validate a name and build a fresh queued request
    pub fn new(name: &str, source: JobSource) -> Result<Self> {
        let display = collapse_whitespace(name);
        if display.is_empty() {
            return Err(Error::validation("name is empty"));
        }
        if display.chars().count() > MAX_NAME_CHARS {
            return Err(Error::validation(format!(
                "name exceeds {} characters",
                MAX_NAME_CHARS
            )));
        }
        if display.chars().any(char::is_control) {
            return Err(Error::validation("name contains control characters"));
        }

        Ok(Self {
            id: JobId::new(),
            normalized_name: display.to_lowercase(),
            name: display,
            source,
            submitted_at: Utc::now(),
            status: JobStatus::Queued,
            retry_count: 0,
            not_before: None,
            completed_at: None,
            error: None,
            placement: None,
        })
    }

    /// Whether the request may be dequeued at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.not_before.map_or(true, |t| t <= now)
    }
}

fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deduplication key: trimmed, whitespace-collapsed, case-folded
pub fn normalize_name(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Alice  "), "alice");
        assert_eq!(normalize_name("ALICE\tSmith"), "alice smith");
        assert_eq!(normalize_name("Zoë"), "zoë");
    }

    #[test]
    fn test_new_request_validates_name() {
        let req = EngraveRequest::new("  Bob   the  Builder ", JobSource::Manual).unwrap();
        assert_eq!(req.name, "Bob the Builder");
        assert_eq!(req.normalized_name, "bob the builder");
        assert_eq!(req.status, JobStatus::Queued);
        assert_eq!(req.retry_count, 0);

        assert!(EngraveRequest::new("   ", JobSource::Manual).is_err());
        let long = "x".repeat(MAX_NAME_CHARS + 1);
        assert!(EngraveRequest::new(&long, JobSource::Manual).is_err());
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("gift".parse::<JobSource>().unwrap(), JobSource::Gift);
        assert_eq!(" Test ".parse::<JobSource>().unwrap(), JobSource::Test);
        assert!("twitch-raid".parse::<JobSource>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Engraving).unwrap();
        assert_eq!(json, "\"engraving\"");
        assert!(JobStatus::Placed.is_pending());
        assert!(JobStatus::Failed.is_terminal());
    }
}
