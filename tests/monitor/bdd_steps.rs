//! BDD step definitions for the monitor scenarios.

use std::future;
use std::time::Duration;

use batchwatch::compute::ResourceKind;
use batchwatch::jobs::JobNumber;
use batchwatch::meter::Meter;
use batchwatch::monitor::Monitor;
use batchwatch::provision::{BatchService, Provisioner};
use batchwatch::test_support::{ComputeCall, ComputeStep};
use rstest_bdd_macros::{given, then, when};
use tokio::time::{self, Instant};

use super::test_helpers::{MonitorContext, RunOutcome, RunResult, log_text, meter_host};
use crate::batch_plan::batch_plan;
use crate::paused_runtime::paused_runtime;
use crate::scripted_status::{list, resource_kinds, status};
use crate::test_constants::{CONTROLLER, JOB_NUMBER};

const METER_POLL_INTERVAL: Duration = Duration::from_secs(7);

fn outcome(monitor_context: &MonitorContext) -> RunOutcome {
    monitor_context
        .outcome
        .unwrap_or_else(|| panic!("the monitor has not run"))
}

fn run_service(
    mut monitor_context: MonitorContext,
    cancel_after: Option<Duration>,
) -> MonitorContext {
    let runtime = paused_runtime();
    let mut service = BatchService::with_sink(
        Provisioner::new(
            monitor_context.compute.clone(),
            monitor_context.jobs.clone(),
            batch_plan(),
        ),
        Box::new(monitor_context.output.clone()),
    );
    let outcome = runtime.block_on(async {
        let start = Instant::now();
        let monitor = Monitor::new();
        let result = match cancel_after {
            Some(delay) => monitor.run_until(&mut service, time::sleep(delay)).await,
            None => monitor.run_until(&mut service, future::pending()).await,
        };
        RunOutcome {
            result: RunResult::of(&result),
            elapsed: start.elapsed(),
        }
    });
    monitor_context.outcome = Some(outcome);
    monitor_context
}

#[given("a batch service")]
fn batch_service(monitor_context: MonitorContext) -> MonitorContext {
    monitor_context
}

#[given("a meter for license \"{license}\" on host \"{host}\" carrying \"{attached}\"")]
fn meter_on_host(
    mut monitor_context: MonitorContext,
    license: String,
    host: String,
    attached: String,
) -> MonitorContext {
    let compute = meter_host(host.trim());
    compute.add_license(attached.trim());
    monitor_context.compute = compute;
    monitor_context.license_id = license.trim().to_owned();
    monitor_context
}

#[given("the job reports \"{statuses}\"")]
fn job_reports(monitor_context: MonitorContext, statuses: String) -> MonitorContext {
    for name in list(&statuses) {
        monitor_context.jobs.push_status(status(name));
    }
    monitor_context
}

#[given("the job log reads \"{first}\" and then \"{second}\"")]
fn job_log_reads(
    monitor_context: MonitorContext,
    first: String,
    second: String,
) -> MonitorContext {
    monitor_context.jobs.push_tail(&log_text(&list(&first)));
    monitor_context.jobs.push_tail(&log_text(&list(&second)));
    monitor_context
}

#[given("creating the reservation fails")]
fn reservation_fails(monitor_context: MonitorContext) -> MonitorContext {
    monitor_context.compute.fail(ComputeStep::CreateReservation);
    monitor_context
}

#[given("the controller instance is gone")]
fn controller_gone(monitor_context: MonitorContext) -> MonitorContext {
    monitor_context.compute.set_instance_exists(false);
    monitor_context
}

#[when("the monitor runs to completion")]
fn monitor_runs(monitor_context: MonitorContext) -> MonitorContext {
    run_service(monitor_context, None)
}

#[when("the monitor is cancelled after {seconds} seconds")]
fn monitor_cancelled(monitor_context: MonitorContext, seconds: u64) -> MonitorContext {
    run_service(monitor_context, Some(Duration::from_secs(seconds)))
}

#[when("the meter runs to completion")]
fn meter_runs(mut monitor_context: MonitorContext) -> MonitorContext {
    let runtime = paused_runtime();
    let jobs = monitor_context.jobs.clone();
    let compute = monitor_context.compute.clone();
    let license_id = monitor_context.license_id.clone();
    let outcome = runtime.block_on(async move {
        let mut meter = Meter::connect(
            jobs,
            JobNumber::from(JOB_NUMBER),
            compute,
            String::from(CONTROLLER),
            license_id,
        )
        .await
        .unwrap_or_else(|err| panic!("credentials should be accepted: {err}"));
        let start = Instant::now();
        let result = Monitor::new()
            .with_poll_interval(METER_POLL_INTERVAL)
            .run_until(&mut meter, future::pending())
            .await;
        RunOutcome {
            result: RunResult::of(&result),
            elapsed: start.elapsed(),
        }
    });
    monitor_context.outcome = Some(outcome);
    monitor_context
}

#[then("the run succeeds")]
fn run_succeeds(monitor_context: &MonitorContext) {
    assert_eq!(outcome(monitor_context).result, RunResult::Succeeded);
}

#[then("the run fails as an unsuccessful job")]
fn run_fails_job(monitor_context: &MonitorContext) {
    assert_eq!(outcome(monitor_context).result, RunResult::JobFailed);
}

#[then("the run fails during initialisation")]
fn run_fails_init(monitor_context: &MonitorContext) {
    assert_eq!(outcome(monitor_context).result, RunResult::InitFailed);
}

#[then("the run lasts {seconds} seconds")]
fn run_lasts(monitor_context: &MonitorContext, seconds: u64) {
    assert_eq!(outcome(monitor_context).elapsed, Duration::from_secs(seconds));
}

#[then("the instance is created once, {seconds} seconds after the template")]
fn instance_created_once(monitor_context: &MonitorContext, seconds: u64) {
    let timed = monitor_context.compute.timed_calls();
    let instances: Vec<Duration> = timed
        .iter()
        .filter(|(_, call)| matches!(call, ComputeCall::CreateInstance(_)))
        .map(|(offset, _)| *offset)
        .collect();
    assert!(
        matches!(timed.first(), Some((_, ComputeCall::CreateTemplate(_)))),
        "the template should come first: {timed:?}"
    );
    assert_eq!(instances, [Duration::from_secs(seconds)]);
}

#[then("the first poll sees the job stopped after {seconds} seconds")]
fn first_poll_stops(monitor_context: &MonitorContext, seconds: u64) {
    assert_eq!(outcome(monitor_context).elapsed, Duration::from_secs(seconds));
    // Three start polls while provisioning, one monitor poll, one exit check.
    assert_eq!(monitor_context.jobs.status_calls(), 5);
}

#[then("no job output is relayed")]
fn no_output(monitor_context: &MonitorContext) {
    assert_eq!(monitor_context.output.contents(), "");
}

#[then("the relayed output is \"{lines}\"")]
fn relayed_output(monitor_context: &MonitorContext, lines: String) {
    assert_eq!(monitor_context.output.contents(), log_text(&list(&lines)));
}

#[then("the job is terminated")]
fn job_terminated(monitor_context: &MonitorContext) {
    assert_eq!(
        monitor_context.jobs.terminations(),
        [JobNumber::from(JOB_NUMBER)]
    );
}

#[then("no job is submitted")]
fn no_submission(monitor_context: &MonitorContext) {
    assert!(monitor_context.jobs.submissions().is_empty());
}

#[then("the job status is never polled")]
fn never_polled(monitor_context: &MonitorContext) {
    assert_eq!(monitor_context.jobs.status_calls(), 0);
}

#[then("the teardown deletes \"{kinds}\"")]
fn teardown_deletes(monitor_context: &MonitorContext, kinds: String) {
    let deleted: Vec<ResourceKind> = monitor_context
        .compute
        .deletes()
        .into_iter()
        .map(|(kind, _)| kind)
        .collect();
    assert_eq!(deleted, resource_kinds(&kinds));
}

#[then("the meter deletes \"{kinds}\" named \"{name}\"")]
fn meter_deletes(monitor_context: &MonitorContext, kinds: String, name: String) {
    let expected: Vec<(ResourceKind, String)> = resource_kinds(&kinds)
        .into_iter()
        .map(|kind| (kind, name.trim().to_owned()))
        .collect();
    assert_eq!(monitor_context.compute.deletes(), expected);
}
