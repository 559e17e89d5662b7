//! BDD step definitions for provisioning rollback.

use batchwatch::jobs::JobNumber;
use batchwatch::provision::{ProvisionState, Provisioner};
use batchwatch::test_support::{ComputeCall, ComputeStep};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{FailedStep, ProvisionContext, ProvisionOutcome, transport};
use crate::batch_plan::batch_plan;
use crate::paused_runtime::paused_runtime;
use crate::scripted_status::{list, resource_kinds, status};
use crate::test_constants::{CONTROLLER, JOB_NUMBER};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn outcome(provision_context: &ProvisionContext) -> Result<&ProvisionOutcome, StepError> {
    provision_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing outcome")))
}

#[given("a provisioner for the batch plan")]
fn provisioner_for_plan(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context
}

#[given("the job reports \"{statuses}\" while starting")]
fn job_reports(provision_context: ProvisionContext, statuses: String) -> ProvisionContext {
    for name in list(&statuses) {
        provision_context.jobs.push_status(status(name));
    }
    provision_context
}

#[given("the \"{step}\" step fails")]
fn step_fails(provision_context: ProvisionContext, step: String) -> ProvisionContext {
    match FailedStep::parse(step.trim()) {
        FailedStep::Template => provision_context.compute.fail(ComputeStep::CreateTemplate),
        FailedStep::Reservation => provision_context
            .compute
            .fail(ComputeStep::CreateReservation),
        FailedStep::Submit => provision_context.jobs.fail_submit(transport("submit")),
        FailedStep::JobStart => provision_context
            .jobs
            .push_status_error(transport("status")),
        FailedStep::Instance => provision_context.compute.fail(ComputeStep::CreateInstance),
    }
    provision_context
}

#[given("deleting the \"{kind}\" fails")]
fn delete_fails(provision_context: ProvisionContext, kind: String) -> ProvisionContext {
    let step = match kind.trim() {
        "instance" => ComputeStep::DeleteInstance,
        "reservation" => ComputeStep::DeleteReservation,
        "template" => ComputeStep::DeleteTemplate,
        other => panic!("unknown resource kind {other}"),
    };
    provision_context.compute.fail(step);
    provision_context
}

#[when("I provision the batch run")]
fn provision_run(mut provision_context: ProvisionContext) -> ProvisionContext {
    let runtime = paused_runtime();
    let mut provisioner = Provisioner::new(
        provision_context.compute.clone(),
        provision_context.jobs.clone(),
        batch_plan(),
    );

    let failed_step = match runtime.block_on(provisioner.provision()) {
        Ok(_) => None,
        Err(err) => Some(FailedStep::of(&err)),
    };
    let state = provisioner.state();
    let holds_resources = !provisioner.resources().is_empty();
    let rollback_deletes = provision_context.compute.deletes();
    let teardown = runtime.block_on(provisioner.teardown());

    provision_context.outcome = Some(ProvisionOutcome {
        label: provisioner.label().to_owned(),
        state,
        failed_step,
        holds_resources,
        rollback_deletes,
        teardown,
    });
    provision_context
}

#[then("provisioning fails at the \"{step}\" step")]
fn fails_at(provision_context: &ProvisionContext, step: String) -> Result<(), StepError> {
    let expected = FailedStep::parse(step.trim());
    let actual = outcome(provision_context)?.failed_step;
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure at {expected:?}, got {actual:?}"
        )))
    }
}

#[then("provisioning succeeds")]
fn succeeds(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let result = outcome(provision_context)?;
    if result.failed_step.is_none() && result.state == ProvisionState::Done {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected success, got {:?} in state {:?}",
            result.failed_step, result.state
        )))
    }
}

#[then("the attempt is rolled back")]
fn rolled_back(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let result = outcome(provision_context)?;
    if result.state == ProvisionState::RolledBack && !result.holds_resources {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected an empty rolled back attempt, got {:?} holding resources: {}",
            result.state, result.holds_resources
        )))
    }
}

#[then("nothing is deleted")]
fn nothing_deleted(provision_context: &ProvisionContext) {
    assert!(provision_context.compute.deletes().is_empty());
}

#[then("the rollback deletes \"{kinds}\"")]
fn rollback_deletes(provision_context: &ProvisionContext, kinds: String) -> Result<(), StepError> {
    let actual: Vec<_> = outcome(provision_context)?
        .rollback_deletes
        .iter()
        .map(|(kind, _)| *kind)
        .collect();
    let expected = resource_kinds(&kinds);
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected deletes {expected:?}, got {actual:?}"
        )))
    }
}

#[then("every delete names the run label")]
fn deletes_name_label(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let result = outcome(provision_context)?;
    let stray: Vec<_> = result
        .rollback_deletes
        .iter()
        .filter(|(_, name)| *name != result.label)
        .collect();
    if stray.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "deletes outside label {}: {stray:?}",
            result.label
        )))
    }
}

#[then("the job is terminated")]
fn job_terminated(provision_context: &ProvisionContext) {
    assert_eq!(
        provision_context.jobs.terminations(),
        [JobNumber::from(JOB_NUMBER)]
    );
}

#[then("no job is terminated")]
fn no_job_terminated(provision_context: &ProvisionContext) {
    assert!(provision_context.jobs.terminations().is_empty());
}

#[then("a later teardown has nothing left to delete")]
fn later_teardown_is_empty(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let teardown = &outcome(provision_context)?.teardown;
    if teardown.deleted.is_empty() && teardown.failed.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "second teardown touched resources: {teardown:?}"
        )))
    }
}

#[then("the job is submitted once")]
fn submitted_once(provision_context: &ProvisionContext) {
    assert_eq!(provision_context.jobs.submissions().len(), 1);
}

#[then("the template names the controller host")]
fn template_names_controller(provision_context: &ProvisionContext) {
    let calls = provision_context.compute.calls();
    let Some(ComputeCall::CreateTemplate(template)) = calls.first() else {
        panic!("first call should create the template: {calls:?}");
    };
    assert!(
        template.container_args.iter().any(|arg| arg == CONTROLLER),
        "template args: {:?}",
        template.container_args
    );
}

#[then("the teardown deletes \"{kinds}\"")]
fn teardown_deletes(provision_context: &ProvisionContext, kinds: String) -> Result<(), StepError> {
    let teardown = &outcome(provision_context)?.teardown;
    let expected = resource_kinds(&kinds);
    if teardown.is_clean() && teardown.deleted == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected clean teardown of {expected:?}, got {teardown:?}"
        )))
    }
}
