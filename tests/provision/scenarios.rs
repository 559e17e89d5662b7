//! BDD scenarios for provisioning rollback.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(path = "tests/features/provision.feature", name = "Template creation fails")]
fn scenario_template_fails(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(path = "tests/features/provision.feature", name = "Reservation creation fails")]
fn scenario_reservation_fails(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(path = "tests/features/provision.feature", name = "Job submission fails")]
fn scenario_submit_fails(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "The job fails before it starts"
)]
fn scenario_job_start_fails(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(path = "tests/features/provision.feature", name = "Instance creation fails")]
fn scenario_instance_fails(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Failed deletes do not mask the original error"
)]
fn scenario_failed_deletes(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "A started run is torn down completely"
)]
fn scenario_full_teardown(provision_context: ProvisionContext) {
    let _ = provision_context;
}
