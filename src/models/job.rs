use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Job lifecycle. Transitions only move forward:
/// `Pending -> Executing -> Completed | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Pending,
    Executing,
    Completed,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            Phase::Pending => 0,
            Phase::Executing => 1,
            Phase::Completed | Phase::Error => 2,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_advance_to(&self, next: Phase) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "PENDING",
            Phase::Executing => "EXECUTING",
            Phase::Completed => "COMPLETED",
            Phase::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result serialization requested at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/xml")]
    VoTable,
}

impl OutputFormat {
    /// Pick a format from an `Accept` header value. JSON unless XML is asked for.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(value)
                if value.contains("application/xml")
                    || value.contains("text/xml")
                    || value.contains("application/x-votable+xml") =>
            {
                OutputFormat::VoTable
            }
            _ => OutputFormat::Json,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::VoTable => "application/xml",
        }
    }
}

/// Error artifact persisted for a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: Option<String>,
    pub code: Option<String>,
}

impl From<&crate::api::middleware::AppError> for JobError {
    fn from(err: &crate::api::middleware::AppError) -> Self {
        let (state, code) = match err {
            crate::api::middleware::AppError::Execution { state, code, .. } => {
                (state.clone(), code.map(|c| c.to_string()))
            }
            _ => (None, None),
        };
        Self {
            message: err.message(),
            kind: err.kind().to_string(),
            state,
            code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub phase: Phase,
    /// The query text as submitted.
    pub parameters: String,
    pub format: OutputFormat,
    pub result_location: Option<PathBuf>,
    pub error_location: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(parameters: String, format: OutputFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phase: Phase::Pending,
            parameters,
            format,
            result_location: None,
            error_location: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_executing(&mut self) {
        if self.phase.can_advance_to(Phase::Executing) {
            self.phase = Phase::Executing;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self, result_location: PathBuf) {
        if self.phase.can_advance_to(Phase::Completed) {
            self.phase = Phase::Completed;
            self.result_location = Some(result_location);
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn mark_failed(&mut self, error_location: PathBuf, error: JobError) {
        if self.phase.can_advance_to(Phase::Error) {
            self.phase = Phase::Error;
            self.error_location = Some(error_location);
            self.error = Some(error);
            self.finished_at = Some(Utc::now());
        }
    }
}
