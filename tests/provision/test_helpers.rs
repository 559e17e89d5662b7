//! Shared fixtures for provisioning scenarios.

use batchwatch::compute::{ResourceKind, TeardownReport};
use batchwatch::jobs::JobError;
use batchwatch::provision::{ProvisionError, ProvisionState};
use batchwatch::test_support::{ScriptedCompute, ScriptedFailure, ScriptedJobService};
use rstest::fixture;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailedStep {
    Template,
    Reservation,
    Submit,
    JobStart,
    Instance,
}

impl FailedStep {
    pub fn parse(name: &str) -> Self {
        match name {
            "template" => Self::Template,
            "reservation" => Self::Reservation,
            "submit" => Self::Submit,
            "job start" => Self::JobStart,
            "instance" => Self::Instance,
            other => panic!("unknown provisioning step {other}"),
        }
    }

    pub const fn of(err: &ProvisionError<ScriptedFailure>) -> Self {
        match err {
            ProvisionError::Template { .. } => Self::Template,
            ProvisionError::Reservation { .. } => Self::Reservation,
            ProvisionError::Submit { .. } => Self::Submit,
            ProvisionError::JobStart { .. } => Self::JobStart,
            ProvisionError::Instance { .. } => Self::Instance,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProvisionOutcome {
    pub label: String,
    pub state: ProvisionState,
    pub failed_step: Option<FailedStep>,
    pub holds_resources: bool,
    pub rollback_deletes: Vec<(ResourceKind, String)>,
    pub teardown: TeardownReport,
}

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub compute: ScriptedCompute,
    pub jobs: ScriptedJobService,
    pub outcome: Option<ProvisionOutcome>,
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    ProvisionContext {
        compute: ScriptedCompute::new(),
        jobs: ScriptedJobService::new(),
        outcome: None,
    }
}

pub fn transport(endpoint: &str) -> JobError {
    JobError::Transport {
        endpoint: endpoint.to_owned(),
        message: String::from("connection reset"),
    }
}
