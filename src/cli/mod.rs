//! Command-line interface definitions for the `batchwatch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;
use clap::builder::NonEmptyStringValueParser;

/// Top-level CLI for the `batchwatch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "batchwatch",
    about = "Provision a Compute Engine VM for one JARVICE batch job, watch it, and tear it down",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision resources, submit the job and relay its output.
    #[command(
        name = "service",
        about = "Provision resources, submit the job and relay its output"
    )]
    Service(ServiceCommand),
    /// Watch a job from the instance provisioned for it.
    #[command(name = "meter", about = "Watch a job from the instance provisioned for it")]
    Meter(MeterCommand),
    /// Delete the template, reservation and instance sharing one label.
    #[command(
        name = "cleanup",
        about = "Delete the template, reservation and instance sharing one label"
    )]
    Cleanup(CleanupCommand),
}

/// Arguments for the `batchwatch service` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServiceCommand {
    /// Job-control API base URL; overrides `JARVICE_API_HOST`.
    #[arg(long, value_name = "URL")]
    pub(crate) api_host: Option<String>,
    /// Job-control machine type; overrides `JARVICE_MACHINE`.
    #[arg(long, value_name = "TYPE")]
    pub(crate) machine: Option<String>,
    /// Job-control user name.
    #[arg(long, env = "JARVICE_API_USER", value_name = "USER")]
    pub(crate) username: Option<String>,
    /// Job-control API key.
    #[arg(long, env = "JARVICE_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub(crate) apikey: Option<String>,
    /// Object-store access key forwarded to the job.
    #[arg(
        long,
        env = "S3_ACCESS_KEY",
        hide_env_values = true,
        value_name = "KEY",
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub(crate) s3_access_key: String,
    /// Object-store secret key forwarded to the job.
    #[arg(
        long,
        env = "S3_SECRET_KEY",
        hide_env_values = true,
        value_name = "KEY",
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub(crate) s3_secret_key: String,
    /// Application to submit.
    #[arg(long, value_name = "APP", value_parser = NonEmptyStringValueParser::new())]
    pub(crate) dragen_app: String,
    /// Service account for the meter instance; overrides
    /// `BATCHWATCH_SERVICE_ACCOUNT`.
    #[arg(long, value_name = "ACCOUNT")]
    pub(crate) google_sa: Option<String>,
    /// Queue priority; overrides `JARVICE_JOB_PRIORITY`.
    #[arg(long, value_name = "PRIORITY")]
    pub(crate) job_priority: Option<String>,
    /// License server appended to the job arguments.
    #[arg(long, env = "ILLUMINA_LIC_SERVER", value_name = "URL")]
    pub(crate) lic_server: Option<String>,
    /// Arguments passed to the remote command (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) args: Vec<String>,
}

/// Arguments for the `batchwatch meter` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct MeterCommand {
    /// Job-control API base URL.
    #[arg(long, value_name = "URL")]
    pub(crate) api_host: String,
    /// Job-control user name.
    #[arg(long, value_name = "USER")]
    pub(crate) username: String,
    /// Job-control API key.
    #[arg(long, value_name = "KEY")]
    pub(crate) apikey: String,
    /// Number of the job to watch.
    #[arg(long, value_name = "NUMBER")]
    pub(crate) job_id: String,
    /// Name of the controller instance that must stay alive.
    #[arg(long, value_name = "NAME")]
    pub(crate) service_name: String,
    /// License id this host must carry.
    #[arg(
        long,
        env = "BATCHWATCH_LICENSE_ID",
        value_name = "ID",
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub(crate) license_id: String,
}

/// Arguments for the `batchwatch cleanup` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CleanupCommand {
    /// Label to delete; defaults to this host's instance name.
    #[arg(long, value_name = "LABEL")]
    pub(crate) label: Option<String>,
}
