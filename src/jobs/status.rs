//! Remote job status taxonomy.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use super::{JobError, JobNumber};

const STATUS_STARTING: &str = "PROCESSING STARTING";
const STATUS_SUBMITTED: &str = "SUBMITTED";
const STATUS_COMPLETED: &str = "COMPLETED";

/// Status of a job as reported by the job-control service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// Queued, not yet running.
    Pending,
    /// The job context exists and the job is processing.
    Starting,
    /// The job finished successfully.
    Completed,
    /// Any other status string reported by the service.
    Failed(String),
    /// The service did not report the job at all.
    NotFound,
}

impl JobStatus {
    /// Maps a remote status string. Matching is exact and case-sensitive.
    #[must_use]
    pub fn from_remote(value: &str) -> Self {
        match value {
            STATUS_STARTING => Self::Starting,
            STATUS_SUBMITTED => Self::Pending,
            STATUS_COMPLETED => Self::Completed,
            other => Self::Failed(other.to_owned()),
        }
    }

    /// Interprets the status for the watch loop.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotActive`] for every status other than
    /// [`JobStatus::Starting`] and [`JobStatus::Pending`].
    pub fn running(&self, number: &JobNumber) -> Result<bool, JobError> {
        match self {
            Self::Starting => Ok(true),
            Self::Pending => Ok(false),
            other => Err(JobError::NotActive {
                number: number.clone(),
                status: other.clone(),
            }),
        }
    }

    /// Returns `true` only for [`JobStatus::Completed`].
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str(STATUS_SUBMITTED),
            Self::Starting => f.write_str(STATUS_STARTING),
            Self::Completed => f.write_str(STATUS_COMPLETED),
            Self::Failed(raw) => write!(f, "{raw}"),
            Self::NotFound => f.write_str("not found"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    #[serde(default)]
    job_status: Option<String>,
}

/// Decodes a `/jarvice/status` body and extracts the status for `number`.
pub(super) fn status_from_body(body: &[u8], number: &JobNumber) -> Result<JobStatus, JobError> {
    let entries: HashMap<String, StatusEntry> =
        serde_json::from_slice(body).map_err(|err| JobError::Decode {
            endpoint: String::from("status"),
            message: err.to_string(),
        })?;

    Ok(entries
        .get(number.as_str())
        .and_then(|entry| entry.job_status.as_deref())
        .map_or(JobStatus::NotFound, JobStatus::from_remote))
}
