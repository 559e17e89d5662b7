//! Job-control service client, status taxonomy and tail deduplication.
//!
//! The job-control service queues one batch job per run. It is driven through
//! the [`JobService`] trait so the provisioner and the watchers can be
//! exercised against scripted doubles; [`JobClient`] is the HTTP
//! implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{info, warn};

mod client;
mod status;
mod submission;
mod tail;

pub use client::JobClient;
pub use status::JobStatus;
pub use submission::{JobRequest, encode_arguments, render_batch_command};
pub use tail::{COMPARE_WINDOW, TAIL_LENGTH, TailWindow};

/// Identifier assigned to a job by the job-control service.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct JobNumber(String);

impl JobNumber {
    /// Returns the number as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobNumber {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for JobNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials presented on every job-control request.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Account user name.
    pub username: String,
    /// API key for the account.
    pub apikey: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("apikey", &"<redacted>")
            .finish()
    }
}

/// Errors raised while talking to the job-control service.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JobError {
    /// Raised when the configured API host is not a valid base URL.
    #[error("invalid job-control API host {host}: {message}")]
    InvalidHost {
        /// Host as configured.
        host: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the request could not be sent or the body not read.
    #[error("{endpoint} request failed: {message}")]
    Transport {
        /// Endpoint name (for example `status`).
        endpoint: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the service answers with a non-200 status.
    #[error("{endpoint} returned HTTP {status}")]
    HttpStatus {
        /// Endpoint name.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode {endpoint} response: {message}")]
    Decode {
        /// Endpoint name.
        endpoint: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when the job reports a status that is neither pending nor
    /// processing.
    #[error("job {number} is not active (status: {status})")]
    NotActive {
        /// Job being polled.
        number: JobNumber,
        /// Status reported by the service.
        status: JobStatus,
    },
    /// Raised when the job did not complete successfully.
    #[error("job {number} failed (status: {status})")]
    Unsuccessful {
        /// Job being checked.
        number: JobNumber,
        /// Final status reported by the service.
        status: JobStatus,
    },
}

/// Future returned by job-control operations.
pub type JobFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, JobError>> + Send + 'a>>;

/// Operations offered by the job-control service.
pub trait JobService: Send + Sync {
    /// Verifies the configured credentials.
    fn check_auth(&self) -> JobFuture<'_, ()>;

    /// Submits a job and returns its number.
    fn submit<'a>(&'a self, request: &'a JobRequest) -> JobFuture<'a, JobNumber>;

    /// Fetches the current status of a job.
    fn status<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, JobStatus>;

    /// Fetches the full currently available output tail of a job.
    fn tail<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, String>;

    /// Requests termination of a job.
    ///
    /// Termination is fire-and-forget: the service's answer is ignored and
    /// only transport failures surface. Callers are free to discard the
    /// result.
    fn terminate<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, ()>;

    /// Renders a shell script that terminates `number` when executed.
    fn shutdown_script(&self, number: &JobNumber) -> String;
}

/// A submitted job bound to the service that owns it.
#[derive(Clone, Debug)]
pub struct JobHandle<S> {
    service: S,
    number: JobNumber,
}

impl<S: JobService> JobHandle<S> {
    /// Binds `number` to `service`.
    #[must_use]
    pub const fn new(service: S, number: JobNumber) -> Self {
        Self { service, number }
    }

    /// Returns the job number.
    #[must_use]
    pub const fn number(&self) -> &JobNumber {
        &self.number
    }

    /// Returns the underlying service.
    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Polls the job and interprets the status for the watch loop.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] on transport failures and for every status other
    /// than pending or processing.
    pub async fn running_with_error(&self) -> Result<bool, JobError> {
        self.service.status(&self.number).await?.running(&self.number)
    }

    /// Like [`JobHandle::running_with_error`], logging errors as `false`.
    pub async fn running(&self) -> bool {
        self.running_with_error().await.unwrap_or_else(|err| {
            warn!(job = %self.number, error = %err, "job is not running");
            false
        })
    }

    /// Checks whether the job completed successfully.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Unsuccessful`] for any final status other than
    /// completed, or the underlying transport error.
    pub async fn exit_success_with_error(&self) -> Result<(), JobError> {
        let status = self.service.status(&self.number).await?;
        if status.succeeded() {
            return Ok(());
        }
        Err(JobError::Unsuccessful {
            number: self.number.clone(),
            status,
        })
    }

    /// Like [`JobHandle::exit_success_with_error`], logging errors as `false`.
    pub async fn exit_success(&self) -> bool {
        match self.exit_success_with_error().await {
            Ok(()) => true,
            Err(err) => {
                warn!(job = %self.number, error = %err, "job did not succeed");
                false
            }
        }
    }

    /// Requests termination, logging a transport failure instead of
    /// returning it.
    pub async fn terminate(&self) {
        info!(job = %self.number, "terminating job (best effort)");
        if let Err(err) = self.service.terminate(&self.number).await {
            warn!(job = %self.number, error = %err, "terminate request failed");
        }
    }
}
