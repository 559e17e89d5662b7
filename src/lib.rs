//! Core library for the batchwatch job controller.
//!
//! The crate provisions a Compute Engine instance template, reservation and
//! instance for one JARVICE batch job, watches the job through a generic poll
//! loop, relays its output without duplicates, and tears every resource down
//! again whether the job succeeds, fails or is interrupted.

pub mod compute;
pub mod config;
pub mod google;
pub mod jobs;
pub mod logging;
pub mod meter;
pub mod monitor;
pub mod provision;
pub mod test_support;

pub use compute::{Compute, HostIdentity, ResourceKind, TeardownReport, sweep_label};
pub use config::{ConfigError, JarviceConfig, ProvisionConfig};
pub use google::{GoogleCompute, GoogleComputeError};
pub use jobs::{JobClient, JobError, JobHandle, JobNumber, JobService, JobStatus, TailWindow};
pub use meter::{Meter, MeterError};
pub use monitor::{Monitor, MonitorError, Watchable};
pub use provision::{BatchPlan, BatchService, ProvisionError, Provisioner};
