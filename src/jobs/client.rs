//! HTTP client for the JARVICE job-control API.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use super::status::status_from_body;
use super::submission::{Submission, SubmissionResponse};
use super::{Credentials, JobError, JobFuture, JobNumber, JobRequest, JobService, JobStatus};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Job-control client over form-encoded POSTs.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct JobClient {
    http: reqwest::Client,
    base: String,
    terminate_url: Url,
    credentials: Credentials,
}

impl JobClient {
    /// Builds a client for `api_host` (for example
    /// `https://cloud.nimbix.net/api`).
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidHost`] when `api_host` does not form a
    /// valid URL.
    pub fn new(api_host: &str, credentials: Credentials) -> Result<Self, JobError> {
        let base = api_host.trim_end_matches('/').to_owned();
        let terminate_url =
            Url::parse(&format!("{base}/jarvice/terminate")).map_err(|err| {
                JobError::InvalidHost {
                    host: api_host.to_owned(),
                    message: err.to_string(),
                }
            })?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "job-control client setup failed; requests have no timeout");
                reqwest::Client::new()
            });

        Ok(Self {
            http,
            base,
            terminate_url,
            credentials,
        })
    }

    /// Returns the credentials presented on each request.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/jarvice/{name}", self.base)
    }

    async fn post_form(
        &self,
        name: &'static str,
        number: Option<&JobNumber>,
    ) -> Result<reqwest::Response, JobError> {
        let mut form = vec![
            ("username", self.credentials.username.as_str()),
            ("apikey", self.credentials.apikey.as_str()),
        ];
        if let Some(job) = number {
            form.push(("number", job.as_str()));
        }

        debug!(endpoint = name, "posting job-control request");
        self.http
            .post(self.endpoint(name))
            .form(&form)
            .send()
            .await
            .map_err(|err| transport(name, &err))
    }

    async fn read_ok(
        name: &'static str,
        response: reqwest::Response,
    ) -> Result<Vec<u8>, JobError> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(JobError::HttpStatus {
                endpoint: name.to_owned(),
                status: status.as_u16(),
            });
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| transport(name, &err))
    }

    async fn check_auth_inner(&self) -> Result<(), JobError> {
        let response = self.post_form("machines", None).await?;
        Self::read_ok("machines", response).await.map(|_| ())
    }

    async fn submit_inner(&self, request: &JobRequest) -> Result<JobNumber, JobError> {
        let body = Submission::new(request, &self.credentials);
        let response = self
            .http
            .post(self.endpoint("submit"))
            .json(&body)
            .send()
            .await
            .map_err(|err| transport("submit", &err))?;
        let bytes = Self::read_ok("submit", response).await?;
        let decoded: SubmissionResponse =
            serde_json::from_slice(&bytes).map_err(|err| JobError::Decode {
                endpoint: String::from("submit"),
                message: err.to_string(),
            })?;
        Ok(JobNumber::from(decoded.number.to_string()))
    }

    async fn status_inner(&self, number: &JobNumber) -> Result<JobStatus, JobError> {
        let response = self.post_form("status", Some(number)).await?;
        let bytes = Self::read_ok("status", response).await?;
        status_from_body(&bytes, number)
    }

    async fn tail_inner(&self, number: &JobNumber) -> Result<String, JobError> {
        let response = self.post_form("tail", Some(number)).await?;
        let bytes = Self::read_ok("tail", response).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn terminate_inner(&self, number: &JobNumber) -> Result<(), JobError> {
        self.post_form("terminate", Some(number)).await.map(|_| ())
    }
}

fn transport(endpoint: &str, err: &reqwest::Error) -> JobError {
    JobError::Transport {
        endpoint: endpoint.to_owned(),
        message: err.to_string(),
    }
}

impl JobService for JobClient {
    fn check_auth(&self) -> JobFuture<'_, ()> {
        Box::pin(self.check_auth_inner())
    }

    fn submit<'a>(&'a self, request: &'a JobRequest) -> JobFuture<'a, JobNumber> {
        Box::pin(self.submit_inner(request))
    }

    fn status<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, JobStatus> {
        Box::pin(self.status_inner(number))
    }

    fn tail<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, String> {
        Box::pin(self.tail_inner(number))
    }

    fn terminate<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, ()> {
        Box::pin(self.terminate_inner(number))
    }

    fn shutdown_script(&self, number: &JobNumber) -> String {
        let mut url = self.terminate_url.clone();
        url.query_pairs_mut()
            .append_pair("username", &self.credentials.username)
            .append_pair("apikey", &self.credentials.apikey)
            .append_pair("number", number.as_str());
        let quoted = shell_escape::unix::escape(url.as_str().into());
        format!("#!/bin/bash\ncurl {quoted}\n")
    }
}
