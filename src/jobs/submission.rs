//! Job submission payloads.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::Credentials;

const BATCH_COMMAND: &str = "Batch";
const BATCH_GEOMETRY: &str = "1,920x1,080";
const EPHEMERAL_VAULT: &str = "ephemeral";
const ARGS_VARIABLE: &str = "BATCH_ARGS";

/// What the caller wants queued.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobRequest {
    /// Application the job runs.
    pub app: String,
    /// Machine type requested from the job-control service.
    pub machine: String,
    /// Queue priority (for example `normal`).
    pub priority: String,
    /// Shell command executed by the application.
    pub command: String,
    /// Compute identifier of the controller host.
    pub compute_id: String,
    /// Project of the controller host.
    pub project: String,
    /// Zone of the controller host.
    pub zone: String,
}

/// Encodes arguments into a single base64 blob.
///
/// Arguments are joined with spaces, matching how the remote side expands the
/// decoded blob unquoted into the command line.
#[must_use]
pub fn encode_arguments(args: &[String]) -> String {
    STANDARD.encode(args.join(" "))
}

/// Renders the remote command that decodes `encoded_args` and runs
/// `program` with them.
#[must_use]
pub fn render_batch_command(program: &str, encoded_args: &str) -> String {
    format!(
        "{ARGS_VARIABLE}=$(echo {encoded_args} | base64 -d); {program} ${ARGS_VARIABLE}"
    )
}

#[derive(Debug, Serialize)]
pub(super) struct Submission<'a> {
    app: &'a str,
    staging: bool,
    job_label: String,
    application: Application<'a>,
    machine: Machine<'a>,
    vault: Vault,
    user: User<'a>,
    job_priority: &'a str,
}

#[derive(Debug, Serialize)]
struct Application<'a> {
    command: &'static str,
    geometry: &'static str,
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
struct Parameters<'a> {
    command: &'a str,
    #[serde(rename = "GCP_VMID")]
    vmid: &'a str,
    #[serde(rename = "GCP_PROJECTID")]
    project: &'a str,
    #[serde(rename = "GCP_ZONE")]
    zone: &'a str,
}

#[derive(Debug, Serialize)]
struct Machine<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    nodes: u32,
}

#[derive(Debug, Serialize)]
struct Vault {
    name: &'static str,
    readonly: bool,
    force: bool,
}

#[derive(Debug, Serialize)]
struct User<'a> {
    username: &'a str,
    apikey: &'a str,
}

impl<'a> Submission<'a> {
    pub(super) fn new(request: &'a JobRequest, credentials: &'a Credentials) -> Self {
        Self {
            app: &request.app,
            staging: false,
            job_label: format!("vmid={}", request.compute_id),
            application: Application {
                command: BATCH_COMMAND,
                geometry: BATCH_GEOMETRY,
                parameters: Parameters {
                    command: &request.command,
                    vmid: &request.compute_id,
                    project: &request.project,
                    zone: &request.zone,
                },
            },
            machine: Machine {
                kind: &request.machine,
                nodes: 1,
            },
            vault: Vault {
                name: EPHEMERAL_VAULT,
                readonly: false,
                force: false,
            },
            user: User {
                username: &credentials.username,
                apikey: &credentials.apikey,
            },
            job_priority: &request.priority,
        }
    }
}

/// Body returned by `/jarvice/submit`.
#[derive(Debug, Deserialize)]
pub(super) struct SubmissionResponse {
    pub(super) number: u64,
}
