//! Configuration loading via `ortho-config`.
//!
//! Two layered structs cover the job-control service and the Compute Engine
//! resources. Each merges defaults, a discovered `batchwatch.toml` and
//! prefixed environment variables; the CLI then applies its own flags on top
//! and calls `validate`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::google::MachineShape;
use crate::jobs::Credentials;

/// Default job-control API endpoint.
pub const DEFAULT_API_HOST: &str = "https://cloud.nimbix.net/api";

/// Job-control settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "JARVICE",
    discovery(
        app_name = "batchwatch",
        env_var = "BATCHWATCH_CONFIG_PATH",
        config_file_name = "batchwatch.toml",
        dotfile_name = ".batchwatch.toml",
        project_file_name = "batchwatch.toml"
    )
)]
pub struct JarviceConfig {
    /// Base URL of the job-control API.
    #[ortho_config(default = DEFAULT_API_HOST.to_owned())]
    pub api_host: String,
    /// Account user name.
    pub api_user: Option<String>,
    /// Account API key.
    pub api_key: Option<String>,
    /// Seconds between monitor polls.
    #[ortho_config(default = 5)]
    pub poll_interval: u64,
    /// Machine type requested for the job.
    #[ortho_config(default = "n1-standard-8".to_owned())]
    pub machine: String,
    /// Queue priority of submitted jobs.
    #[ortho_config(default = "normal".to_owned())]
    pub job_priority: String,
}

/// Compute Engine settings for the resources a run provisions.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BATCHWATCH",
    discovery(
        app_name = "batchwatch",
        env_var = "BATCHWATCH_CONFIG_PATH",
        config_file_name = "batchwatch.toml",
        dotfile_name = ".batchwatch.toml",
        project_file_name = "batchwatch.toml"
    )
)]
pub struct ProvisionConfig {
    /// Service account attached to the meter instance.
    #[ortho_config(default = "default".to_owned())]
    pub service_account: String,
    /// Compute Engine machine type of the meter instance.
    #[ortho_config(default = "n1-standard-8".to_owned())]
    pub machine_type: String,
    /// Project hosting the boot image.
    pub image_project: Option<String>,
    /// Boot image of the meter instance.
    pub image: Option<String>,
    /// Boot disk size in GiB.
    #[ortho_config(default = 10)]
    pub disk_size_gb: u32,
    /// Container image running the meter.
    pub meter_image: Option<String>,
    /// Entrypoint of the meter container.
    #[ortho_config(default = "/usr/local/bin/entrypoint".to_owned())]
    pub meter_command: String,
    /// Program the remote job runs with the decoded arguments.
    #[ortho_config(default = "/opt/edico/bin/dragen".to_owned())]
    pub remote_command: String,
    /// Prefix of generated resource labels.
    #[ortho_config(default = "dragen".to_owned())]
    pub label_prefix: String,
    /// License id the meter host must carry.
    pub license_id: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    flag: Option<&'static str>,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        flag: Option<&'static str>,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            flag,
            toml_key,
            section,
        }
    }

    fn missing(&self) -> ConfigError {
        let flag = self
            .flag
            .map(|flag| format!(", pass {flag},"))
            .unwrap_or_default();
        ConfigError::MissingField(format!(
            "missing {}: set {}{flag} or add {} to [{}] in batchwatch.toml",
            self.description, self.env_var, self.toml_key, self.section
        ))
    }
}

fn require_field<'a>(
    value: Option<&'a str>,
    metadata: &FieldMetadata,
) -> Result<&'a str, ConfigError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(metadata.missing()),
    }
}

const API_HOST: FieldMetadata = FieldMetadata::new(
    "job-control API host",
    "JARVICE_API_HOST",
    Some("--api-host"),
    "api_host",
    "jarvice",
);
const API_USER: FieldMetadata = FieldMetadata::new(
    "job-control user name",
    "JARVICE_API_USER",
    Some("--username"),
    "api_user",
    "jarvice",
);
const API_KEY: FieldMetadata = FieldMetadata::new(
    "job-control API key",
    "JARVICE_API_KEY",
    Some("--apikey"),
    "api_key",
    "jarvice",
);
const MACHINE: FieldMetadata = FieldMetadata::new(
    "job machine type",
    "JARVICE_MACHINE",
    Some("--machine"),
    "machine",
    "jarvice",
);
const JOB_PRIORITY: FieldMetadata = FieldMetadata::new(
    "job priority",
    "JARVICE_JOB_PRIORITY",
    Some("--job-priority"),
    "job_priority",
    "jarvice",
);
const SERVICE_ACCOUNT: FieldMetadata = FieldMetadata::new(
    "service account",
    "BATCHWATCH_SERVICE_ACCOUNT",
    Some("--google-sa"),
    "service_account",
    "batchwatch",
);
const MACHINE_TYPE: FieldMetadata = FieldMetadata::new(
    "Compute Engine machine type",
    "BATCHWATCH_MACHINE_TYPE",
    None,
    "machine_type",
    "batchwatch",
);
const IMAGE_PROJECT: FieldMetadata = FieldMetadata::new(
    "boot image project",
    "BATCHWATCH_IMAGE_PROJECT",
    None,
    "image_project",
    "batchwatch",
);
const IMAGE: FieldMetadata =
    FieldMetadata::new("boot image", "BATCHWATCH_IMAGE", None, "image", "batchwatch");
const METER_IMAGE: FieldMetadata = FieldMetadata::new(
    "meter container image",
    "BATCHWATCH_METER_IMAGE",
    None,
    "meter_image",
    "batchwatch",
);
const METER_COMMAND: FieldMetadata = FieldMetadata::new(
    "meter entrypoint",
    "BATCHWATCH_METER_COMMAND",
    None,
    "meter_command",
    "batchwatch",
);
const REMOTE_COMMAND: FieldMetadata = FieldMetadata::new(
    "remote command",
    "BATCHWATCH_REMOTE_COMMAND",
    None,
    "remote_command",
    "batchwatch",
);

const LICENSE_ID: FieldMetadata = FieldMetadata::new(
    "meter host license id",
    "BATCHWATCH_LICENSE_ID",
    None,
    "license_id",
    "batchwatch",
);

impl JarviceConfig {
    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("batchwatch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Returns the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and flag when either value is missing.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            username: require_field(self.api_user.as_deref(), &API_USER)?.to_owned(),
            apikey: require_field(self.api_key.as_deref(), &API_KEY)?.to_owned(),
        })
    }

    /// Performs semantic validation of every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty required values and
    /// [`ConfigError::Invalid`] for a zero poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(Some(self.api_host.as_str()), &API_HOST)?;
        self.credentials()?;
        require_field(Some(self.machine.as_str()), &MACHINE)?;
        require_field(Some(self.job_priority.as_str()), &JOB_PRIORITY)?;
        if self.poll_interval == 0 {
            return Err(ConfigError::Invalid {
                field: String::from("poll_interval"),
                reason: String::from("JARVICE_POLL_INTERVAL must be at least 1 second"),
            });
        }
        Ok(())
    }
}

impl ProvisionConfig {
    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("batchwatch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the machine shape of provisioned templates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the boot image is not
    /// configured.
    pub fn machine_shape(&self) -> Result<MachineShape, ConfigError> {
        Ok(MachineShape {
            machine_type: require_field(Some(self.machine_type.as_str()), &MACHINE_TYPE)?
                .to_owned(),
            image_project: require_field(self.image_project.as_deref(), &IMAGE_PROJECT)?
                .to_owned(),
            image: require_field(self.image.as_deref(), &IMAGE)?.to_owned(),
            disk_size_gb: self.disk_size_gb,
        })
    }

    /// Returns the meter container image.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when it is not configured.
    pub fn meter_image(&self) -> Result<&str, ConfigError> {
        require_field(self.meter_image.as_deref(), &METER_IMAGE)
    }

    /// Returns the license id forwarded to the meter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when it is not configured.
    pub fn license_id(&self) -> Result<&str, ConfigError> {
        require_field(self.license_id.as_deref(), &LICENSE_ID)
    }

    /// Performs semantic validation of every field the controller needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty required values and
    /// [`ConfigError::Invalid`] for an unusable label prefix or disk size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(Some(self.service_account.as_str()), &SERVICE_ACCOUNT)?;
        self.machine_shape()?;
        self.meter_image()?;
        self.license_id()?;
        require_field(Some(self.meter_command.as_str()), &METER_COMMAND)?;
        require_field(Some(self.remote_command.as_str()), &REMOTE_COMMAND)?;
        if self.disk_size_gb == 0 {
            return Err(ConfigError::Invalid {
                field: String::from("disk_size_gb"),
                reason: String::from("BATCHWATCH_DISK_SIZE_GB must be positive"),
            });
        }
        validate_label_prefix(&self.label_prefix)
    }
}

/// Resource names must start with a lowercase letter and contain only
/// lowercase letters, digits and hyphens.
fn validate_label_prefix(prefix: &str) -> Result<(), ConfigError> {
    let starts_with_letter = prefix.chars().next().is_some_and(|ch| ch.is_ascii_lowercase());
    let well_formed = prefix
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if starts_with_letter && well_formed && prefix.len() <= 20 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field: String::from("label_prefix"),
        reason: format!(
            "{prefix:?} must start with a lowercase letter, use only [a-z0-9-] and be at most 20 characters"
        ),
    })
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration field {field}: {reason}")]
    Invalid {
        /// Field name.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
