//! Normalized job status and the per-provider raw-status adapter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::StatusOverrides;

/// Normalized job status shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PENDING: &[&str] = &[
    "pending",
    "queued",
    "submitted",
    "waiting",
    "created",
    "scheduled",
    "accepted",
];
const PROCESSING: &[&str] = &[
    "processing",
    "running",
    "in_progress",
    "in-progress",
    "started",
    "active",
    "working",
];
const SUCCEEDED: &[&str] = &[
    "succeeded",
    "success",
    "successful",
    "completed",
    "complete",
    "done",
    "processed",
    "finished",
    "ready",
];
const FAILED: &[&str] = &["failed", "failure", "error", "errored", "rejected"];
const CANCELLED: &[&str] = &["cancelled", "canceled", "aborted", "expired"];

/// Maps one provider's raw status strings onto [`JobStatus`].
///
/// Matching is case-insensitive. Strings not in the table count as
/// `Processing`, so an unfamiliar status keeps the job polling until the
/// timeout rather than ending it early.
#[derive(Debug, Clone)]
pub struct StatusVocabulary {
    table: HashMap<String, JobStatus>,
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        let mut table = HashMap::new();
        for (words, status) in [
            (PENDING, JobStatus::Pending),
            (PROCESSING, JobStatus::Processing),
            (SUCCEEDED, JobStatus::Succeeded),
            (FAILED, JobStatus::Failed),
            (CANCELLED, JobStatus::Cancelled),
        ] {
            for word in words {
                table.insert(word.to_string(), status);
            }
        }
        Self { table }
    }
}

impl StatusVocabulary {
    /// Built-in vocabulary with provider overrides layered on top
    pub fn with_overrides(overrides: &StatusOverrides) -> Self {
        let mut vocabulary = Self::default();
        for (words, status) in [
            (&overrides.pending, JobStatus::Pending),
            (&overrides.processing, JobStatus::Processing),
            (&overrides.succeeded, JobStatus::Succeeded),
            (&overrides.failed, JobStatus::Failed),
            (&overrides.cancelled, JobStatus::Cancelled),
        ] {
            for word in words {
                vocabulary.insert(word, status);
            }
        }
        vocabulary
    }

    pub fn insert(&mut self, raw: &str, status: JobStatus) {
        self.table.insert(raw.trim().to_lowercase(), status);
    }

    pub fn normalize(&self, raw: &str) -> JobStatus {
        self.table
            .get(&raw.trim().to_lowercase())
            .copied()
            .unwrap_or(JobStatus::Processing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_vocabulary() {
        let vocabulary = StatusVocabulary::default();
        assert_eq!(vocabulary.normalize("PROCESSED"), JobStatus::Succeeded);
        assert_eq!(vocabulary.normalize("completed"), JobStatus::Succeeded);
        assert_eq!(vocabulary.normalize("succeeded"), JobStatus::Succeeded);
        assert_eq!(vocabulary.normalize(" Queued "), JobStatus::Pending);
        assert_eq!(vocabulary.normalize("IN_PROGRESS"), JobStatus::Processing);
        assert_eq!(vocabulary.normalize("failed"), JobStatus::Failed);
        assert_eq!(vocabulary.normalize("canceled"), JobStatus::Cancelled);
    }

    #[test]
    fn test_unknown_status_keeps_polling() {
        let vocabulary = StatusVocabulary::default();
        assert_eq!(vocabulary.normalize("thinking-hard"), JobStatus::Processing);
        assert_eq!(vocabulary.normalize(""), JobStatus::Processing);
        assert!(!vocabulary.normalize("thinking-hard").is_terminal());
    }

    #[test]
    fn test_overrides_win_over_builtins() {
        let overrides = StatusOverrides {
            succeeded: vec!["GENERATED".to_string()],
            processing: vec!["ready".to_string()],
            ..Default::default()
        };
        let vocabulary = StatusVocabulary::with_overrides(&overrides);
        assert_eq!(vocabulary.normalize("generated"), JobStatus::Succeeded);
        assert_eq!(vocabulary.normalize("READY"), JobStatus::Processing);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert_eq!(JobStatus::Pending.to_string(), "PENDING");
    }
}
