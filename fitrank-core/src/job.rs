//! Job state machine
//!
//! ```text
//! pending -> running -> completed | partial | failed
//! ```
//!
//! Terminal states are final. Results are only attached on `completed` or
//! `partial`; a failed job carries an error and no results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, ErrorCode, RankedCompany};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Partial | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a job last entered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Queued,
    Searching,
    Normalizing,
    Persisting,
    Classifying,
    Scoring,
    Ranking,
    Finished,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Searching => "searching",
            Stage::Normalizing => "normalizing",
            Stage::Persisting => "persisting",
            Stage::Classifying => "classifying",
            Stage::Scoring => "scoring",
            Stage::Ranking => "ranking",
            Stage::Finished => "finished",
        }
    }

    /// Share of the pipeline done once this stage is entered
    pub fn fraction(&self) -> f64 {
        *self as u8 as f64 / Stage::Finished as u8 as f64
    }
}

/// Counters reported while a job runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub stage: Stage,
    pub queries_planned: usize,
    pub queries_failed: usize,
    pub raw_results: usize,
    pub signals: usize,
    pub duplicates: usize,
    pub misses: usize,
    pub classified: usize,
    pub classification_failures: usize,
    pub companies: usize,
}

/// Error attached to a failed or partial job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One ranking run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<RankedCompany>,
    pub error: Option<JobError>,
    pub progress: JobProgress,
}

impl Job {
    pub fn new(query: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            query: query.to_string(),
            created_at,
            completed_at: None,
            results: Vec::new(),
            error: None,
            progress: JobProgress::default(),
        }
    }

    /// pending -> running
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Running)?;
        Ok(())
    }

    /// running -> completed
    pub fn complete(&mut self, results: Vec<RankedCompany>, at: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.results = results;
        self.finish(at);
        Ok(())
    }

    /// running -> partial, keeping whatever results were produced
    pub fn degrade(
        &mut self,
        results: Vec<RankedCompany>,
        error: Option<JobError>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.transition(JobStatus::Partial)?;
        self.results = results;
        self.error = error;
        self.finish(at);
        Ok(())
    }

    /// running -> failed; no results are exposed
    pub fn fail(&mut self, error: JobError, at: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.results.clear();
        self.error = Some(error);
        self.finish(at);
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), CoreError> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Partial)
                | (JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    fn finish(&mut self, at: DateTime<Utc>) {
        self.completed_at = Some(at);
        self.progress.stage = Stage::Finished;
    }
}
