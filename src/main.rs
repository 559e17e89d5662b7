//! Binary entry point for the batchwatch CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::info;

use batchwatch::compute::{Compute, TeardownReport, sweep_label};
use batchwatch::config::{ConfigError, JarviceConfig, ProvisionConfig};
use batchwatch::google::{GoogleCompute, GoogleComputeError, MachineShape};
use batchwatch::jobs::{Credentials, JobClient, JobError, JobNumber};
use batchwatch::logging::{self, LoggingError};
use batchwatch::meter::{Meter, MeterError};
use batchwatch::monitor::{Monitor, MonitorError};
use batchwatch::provision::{
    BatchPlan, BatchService, Provisioner, StorageKeys, job_arguments, meter_arguments,
};

mod cli;

use cli::{CleanupCommand, Cli, MeterCommand, ServiceCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("job-control client error: {0}")]
    Jobs(#[from] JobError),
    #[error("compute setup failed: {0}")]
    Compute(#[from] GoogleComputeError),
    #[error(transparent)]
    Meter(#[from] MeterError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("cleanup of {label} left {failed} resource(s) behind")]
    Cleanup { label: String, failed: usize },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    logging::init()?;
    dispatch(cli).await
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Service(command) => run_service(&command).await,
        Cli::Meter(command) => run_meter(command).await,
        Cli::Cleanup(command) => run_cleanup(command).await,
    }
}

async fn run_service(args: &ServiceCommand) -> Result<(), CliError> {
    let jarvice = jarvice_settings(JarviceConfig::load_without_cli_args()?, args)?;
    let provision = provision_settings(ProvisionConfig::load_without_cli_args()?, args)?;
    let credentials = jarvice.credentials()?;
    let plan = batch_plan(args, &jarvice, &provision, &credentials)?;

    let jobs = JobClient::new(&jarvice.api_host, credentials)?;
    let compute = GoogleCompute::connect(provision.machine_shape()?).await?;
    info!(host = %compute.identity().name, app = %plan.app, "controller starting");

    let mut service = BatchService::new(Provisioner::new(compute, jobs, plan));
    Monitor::new()
        .with_poll_interval(jarvice.poll_interval())
        .run(&mut service)
        .await?;
    Ok(())
}

async fn run_meter(args: MeterCommand) -> Result<(), CliError> {
    let poll_interval = JarviceConfig::load_without_cli_args()?.poll_interval();
    let credentials = Credentials {
        username: args.username,
        apikey: args.apikey,
    };

    let jobs = JobClient::new(&args.api_host, credentials)?;
    let compute = GoogleCompute::connect(MachineShape::default()).await?;
    let mut meter = Meter::connect(
        jobs,
        JobNumber::from(args.job_id),
        compute,
        args.service_name,
        args.license_id,
    )
    .await?;
    Monitor::new()
        .with_poll_interval(poll_interval)
        .run(&mut meter)
        .await?;
    Ok(())
}

async fn run_cleanup(args: CleanupCommand) -> Result<(), CliError> {
    let compute = GoogleCompute::connect(MachineShape::default()).await?;
    let label = args
        .label
        .unwrap_or_else(|| compute.identity().name.clone());
    let report = sweep_label(&compute, &label).await;
    write_report(io::stdout(), &label, &report);
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::Cleanup {
            label,
            failed: report.failed.len(),
        })
    }
}

/// Applies service flags over the loaded job-control configuration.
fn jarvice_settings(
    mut config: JarviceConfig,
    args: &ServiceCommand,
) -> Result<JarviceConfig, CliError> {
    if let Some(host) = &args.api_host {
        config.api_host.clone_from(host);
    }
    if let Some(machine) = &args.machine {
        config.machine.clone_from(machine);
    }
    if let Some(priority) = &args.job_priority {
        config.job_priority.clone_from(priority);
    }
    if args.username.is_some() {
        config.api_user.clone_from(&args.username);
    }
    if args.apikey.is_some() {
        config.api_key.clone_from(&args.apikey);
    }
    config.validate()?;
    Ok(config)
}

/// Applies service flags over the loaded provisioning configuration.
fn provision_settings(
    mut config: ProvisionConfig,
    args: &ServiceCommand,
) -> Result<ProvisionConfig, CliError> {
    if let Some(account) = &args.google_sa {
        config.service_account.clone_from(account);
    }
    config.validate()?;
    Ok(config)
}

fn batch_plan(
    args: &ServiceCommand,
    jarvice: &JarviceConfig,
    provision: &ProvisionConfig,
    credentials: &Credentials,
) -> Result<BatchPlan, CliError> {
    let keys = StorageKeys {
        access_key: args.s3_access_key.clone(),
        secret_key: args.s3_secret_key.clone(),
    };
    Ok(BatchPlan {
        label_prefix: provision.label_prefix.clone(),
        app: args.dragen_app.clone(),
        machine: jarvice.machine.clone(),
        priority: jarvice.job_priority.clone(),
        service_account: provision.service_account.clone(),
        meter_image: provision.meter_image()?.to_owned(),
        meter_command: provision.meter_command.clone(),
        meter_args: meter_arguments(&jarvice.api_host, credentials, provision.license_id()?),
        remote_command: provision.remote_command.clone(),
        encoded_args: job_arguments(&keys, &args.args, args.lic_server.as_deref()),
    })
}

fn write_report(mut target: impl Write, label: &str, report: &TeardownReport) {
    for kind in &report.deleted {
        writeln!(target, "deleted {kind} {label}").ok();
    }
    for failure in &report.failed {
        writeln!(
            target,
            "failed to delete {} {}: {}",
            failure.kind, failure.name, failure.message
        )
        .ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
