//! Shared fixtures for monitor scenarios.

use std::time::Duration;

use batchwatch::compute::HostIdentity;
use batchwatch::monitor::MonitorError;
use batchwatch::test_support::{ScriptedCompute, ScriptedJobService, SharedBuffer};
use rstest::fixture;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunResult {
    Succeeded,
    InitFailed,
    JobFailed,
    SignalFailed,
}

impl RunResult {
    pub const fn of(result: &Result<(), MonitorError>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(MonitorError::Init) => Self::InitFailed,
            Err(MonitorError::JobFailed) => Self::JobFailed,
            Err(MonitorError::Signal(_)) => Self::SignalFailed,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RunOutcome {
    pub result: RunResult,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct MonitorContext {
    pub compute: ScriptedCompute,
    pub jobs: ScriptedJobService,
    pub output: SharedBuffer,
    pub license_id: String,
    pub outcome: Option<RunOutcome>,
}

#[fixture]
pub fn monitor_context() -> MonitorContext {
    MonitorContext {
        compute: ScriptedCompute::new(),
        jobs: ScriptedJobService::new(),
        output: SharedBuffer::new(),
        license_id: String::new(),
        outcome: None,
    }
}

pub fn meter_host(name: &str) -> ScriptedCompute {
    ScriptedCompute::with_identity(HostIdentity {
        project: String::from("test-project"),
        zone: String::from("us-central1-a"),
        network: String::from("default"),
        name: name.to_owned(),
        id: String::from("42"),
    })
}

/// Renders lines the way the job log returns them.
pub fn log_text(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}
