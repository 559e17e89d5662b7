//! What the controller provisions for one batch run.

use uuid::Uuid;

use crate::jobs::{Credentials, encode_arguments};

/// Everything needed to provision and submit one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchPlan {
    /// Prefix of the shared resource label.
    pub label_prefix: String,
    /// Application submitted to the job-control service.
    pub app: String,
    /// Job-control machine type.
    pub machine: String,
    /// Job-control queue priority.
    pub priority: String,
    /// Service account attached to the meter instance.
    pub service_account: String,
    /// Container image of the meter.
    pub meter_image: String,
    /// Entrypoint of the meter container.
    pub meter_command: String,
    /// Meter arguments identifying the job-control service.
    pub meter_args: Vec<String>,
    /// Program the remote job runs with the decoded arguments.
    pub remote_command: String,
    /// Base64 blob of the remote job's arguments.
    pub encoded_args: String,
}

/// Object-store credentials forwarded to the remote job.
#[derive(Clone, Eq, PartialEq)]
pub struct StorageKeys {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
}

impl std::fmt::Debug for StorageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageKeys")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Generates a fresh resource label such as `dragen-3f0c…`.
///
/// The suffix is a random v4 UUID in simple form, so labels stay within the
/// 63 character limit of Compute Engine names for short prefixes.
#[must_use]
pub fn new_label(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Arguments that start the `meter` subcommand against the job-control
/// service and name the license the meter host must carry.
#[must_use]
pub fn meter_arguments(
    api_host: &str,
    credentials: &Credentials,
    license_id: &str,
) -> Vec<String> {
    vec![
        String::from("meter"),
        String::from("--api-host"),
        api_host.to_owned(),
        String::from("--username"),
        credentials.username.clone(),
        String::from("--apikey"),
        credentials.apikey.clone(),
        String::from("--license-id"),
        license_id.to_owned(),
    ]
}

/// Encodes the remote job's arguments.
///
/// Storage keys lead, the caller's arguments follow, and a license server is
/// appended when configured.
#[must_use]
pub fn job_arguments(keys: &StorageKeys, args: &[String], license_server: Option<&str>) -> String {
    let mut all = vec![
        String::from("--s3-access-key"),
        keys.access_key.clone(),
        String::from("--s3-secret-key"),
        keys.secret_key.clone(),
    ];
    all.extend(args.iter().cloned());
    if let Some(server) = license_server.filter(|server| !server.is_empty()) {
        all.push(String::from("--lic-server"));
        all.push(server.to_owned());
    }
    encode_arguments(&all)
}
