//! Provisioning state machine for one batch run.
//!
//! A run creates an instance template, a capacity reservation bound to it,
//! submits the job, waits for the job to start and finally creates the meter
//! instance that consumes the reservation. Any failure rolls back everything
//! created so far, newest first.

use std::time::Duration;

use thiserror::Error;
use tokio::time;
use tracing::{info, warn};

mod plan;
mod service;

pub use plan::{BatchPlan, StorageKeys, job_arguments, meter_arguments, new_label};
pub use service::BatchService;

use crate::compute::{
    Compute, InstanceRequest, JOB_ID_PLACEHOLDER, ResourceKind, TeardownReport, TemplateRequest,
};
use crate::jobs::{JobError, JobHandle, JobNumber, JobRequest, JobService, render_batch_command};

/// Interval between status polls while waiting for the job to start.
pub const START_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Progress of a provisioning attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisionState {
    /// Nothing created yet.
    New,
    /// The template exists.
    TemplateReady,
    /// The reservation exists.
    ReservationReady,
    /// The job has been queued.
    JobSubmitted,
    /// The job reported that it is starting.
    JobStarting,
    /// The meter instance exists.
    InstanceReady,
    /// Provisioning finished.
    Done,
    /// A step failed and the attempt was rolled back.
    RolledBack,
}

/// Resources of one attempt, all named after the same label.
///
/// Presence is tracked from observed create success, so a teardown only
/// touches what this process created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceSet {
    label: String,
    template: bool,
    reservation: bool,
    instance: bool,
}

impl ResourceSet {
    /// Creates an empty set for `label`.
    #[must_use]
    pub const fn new(label: String) -> Self {
        Self {
            label,
            template: false,
            reservation: false,
            instance: false,
        }
    }

    /// Shared name of every resource in the set.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reports whether `kind` is currently held.
    #[must_use]
    pub const fn holds(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Template => self.template,
            ResourceKind::Reservation => self.reservation,
            ResourceKind::Instance => self.instance,
        }
    }

    /// Returns `true` when no resource is held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.template && !self.reservation && !self.instance
    }

    const fn mark(&mut self, kind: ResourceKind, held: bool) {
        match kind {
            ResourceKind::Template => self.template = held,
            ResourceKind::Reservation => self.reservation = held,
            ResourceKind::Instance => self.instance = held,
        }
    }
}

/// Errors raised by [`Provisioner::provision`]. Rollback has already run when
/// one is returned.
#[derive(Debug, Error)]
pub enum ProvisionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the template cannot be created.
    #[error("failed to create template {label}: {source}")]
    Template {
        /// Resource label.
        label: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when the reservation cannot be created.
    #[error("failed to create reservation {label}: {source}")]
    Reservation {
        /// Resource label.
        label: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when the job cannot be submitted.
    #[error("failed to submit job for {label}: {source}")]
    Submit {
        /// Resource label.
        label: String,
        /// Job-control error.
        #[source]
        source: JobError,
    },
    /// Raised when the job fails or disappears before starting.
    #[error("job {number} did not start: {source}")]
    JobStart {
        /// Job number.
        number: JobNumber,
        /// Job-control error.
        #[source]
        source: JobError,
    },
    /// Raised when the meter instance cannot be created.
    #[error("failed to create instance {label}: {source}")]
    Instance {
        /// Resource label.
        label: String,
        /// Provider error.
        #[source]
        source: E,
    },
}

/// Drives one provisioning attempt and owns its teardown.
#[derive(Debug)]
pub struct Provisioner<C, J> {
    compute: C,
    jobs: J,
    plan: BatchPlan,
    resources: ResourceSet,
    job: Option<JobNumber>,
    state: ProvisionState,
    start_poll_interval: Duration,
}

impl<C, J> Provisioner<C, J>
where
    C: Compute,
    J: JobService + Clone,
{
    /// Creates a provisioner with a fresh label derived from the plan.
    #[must_use]
    pub fn new(compute: C, jobs: J, plan: BatchPlan) -> Self {
        let label = new_label(&plan.label_prefix);
        Self {
            compute,
            jobs,
            plan,
            resources: ResourceSet::new(label),
            job: None,
            state: ProvisionState::New,
            start_poll_interval: START_POLL_INTERVAL,
        }
    }

    /// Overrides the interval between start polls.
    #[must_use]
    pub const fn with_start_poll_interval(mut self, interval: Duration) -> Self {
        self.start_poll_interval = interval;
        self
    }

    /// Shared label of this attempt.
    #[must_use]
    pub fn label(&self) -> &str {
        self.resources.label()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProvisionState {
        self.state
    }

    /// Resources currently held.
    #[must_use]
    pub const fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    /// Number of the submitted job, while it is held.
    #[must_use]
    pub const fn job(&self) -> Option<&JobNumber> {
        self.job.as_ref()
    }

    /// Runs every step, rolling back on the first failure.
    ///
    /// # Errors
    ///
    /// Returns the [`ProvisionError`] of the failed step after rollback.
    pub async fn provision(&mut self) -> Result<JobHandle<J>, ProvisionError<C::Error>> {
        match self.advance().await {
            Ok(handle) => {
                self.state = ProvisionState::Done;
                info!(
                    label = %self.resources.label,
                    job = %handle.number(),
                    "provisioning complete"
                );
                Ok(handle)
            }
            Err(err) => {
                warn!(
                    label = %self.resources.label,
                    state = ?self.state,
                    error = %err,
                    "provisioning failed; rolling back"
                );
                self.teardown().await;
                self.state = ProvisionState::RolledBack;
                Err(err)
            }
        }
    }

    async fn advance(&mut self) -> Result<JobHandle<J>, ProvisionError<C::Error>> {
        let label = self.resources.label.clone();
        let identity = self.compute.identity().clone();

        let mut container_args = self.plan.meter_args.clone();
        container_args.extend([
            String::from("--job-id"),
            JOB_ID_PLACEHOLDER.to_owned(),
            String::from("--service-name"),
            identity.name.clone(),
        ]);
        let template = TemplateRequest {
            name: label.clone(),
            service_account: self.plan.service_account.clone(),
            container_image: self.plan.meter_image.clone(),
            container_command: self.plan.meter_command.clone(),
            container_args,
        };
        self.compute
            .create_template(&template)
            .await
            .map_err(|source| ProvisionError::Template {
                label: label.clone(),
                source,
            })?;
        self.resources.mark(ResourceKind::Template, true);
        self.state = ProvisionState::TemplateReady;

        self.compute
            .create_reservation(&label, &label)
            .await
            .map_err(|source| ProvisionError::Reservation {
                label: label.clone(),
                source,
            })?;
        self.resources.mark(ResourceKind::Reservation, true);
        self.state = ProvisionState::ReservationReady;

        let request = JobRequest {
            app: self.plan.app.clone(),
            machine: self.plan.machine.clone(),
            priority: self.plan.priority.clone(),
            command: render_batch_command(&self.plan.remote_command, &self.plan.encoded_args),
            compute_id: identity.id.clone(),
            project: identity.project.clone(),
            zone: identity.zone.clone(),
        };
        let number = self
            .jobs
            .submit(&request)
            .await
            .map_err(|source| ProvisionError::Submit {
                label: label.clone(),
                source,
            })?;
        info!(%label, job = %number, "job submitted");
        self.job = Some(number.clone());
        self.state = ProvisionState::JobSubmitted;

        let handle = JobHandle::new(self.jobs.clone(), number.clone());
        self.wait_for_start(&handle).await?;
        self.state = ProvisionState::JobStarting;

        let instance = InstanceRequest {
            name: label.clone(),
            template: label.clone(),
            reservation: label.clone(),
            job_number: Some(number.as_str().to_owned()),
            shutdown_script: self.jobs.shutdown_script(&number),
        };
        self.compute
            .create_instance(&instance)
            .await
            .map_err(|source| ProvisionError::Instance { label, source })?;
        self.resources.mark(ResourceKind::Instance, true);
        self.state = ProvisionState::InstanceReady;

        Ok(handle)
    }

    async fn wait_for_start(&self, handle: &JobHandle<J>) -> Result<(), ProvisionError<C::Error>> {
        loop {
            let started = handle
                .running_with_error()
                .await
                .map_err(|source| ProvisionError::JobStart {
                    number: handle.number().clone(),
                    source,
                })?;
            if started {
                info!(job = %handle.number(), "job is starting");
                return Ok(());
            }
            info!(
                job = %handle.number(),
                wait_secs = self.start_poll_interval.as_secs(),
                "waiting for job to start"
            );
            time::sleep(self.start_poll_interval).await;
        }
    }

    /// Terminates the job and deletes held resources, newest first.
    ///
    /// Every step is attempted once; failures are logged and reported, never
    /// retried. Held markers are cleared either way, so a second call is a
    /// no-op.
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let label = self.resources.label.clone();

        if self.resources.holds(ResourceKind::Instance) {
            self.resources.mark(ResourceKind::Instance, false);
            report
                .delete(&self.compute, ResourceKind::Instance, &label, false)
                .await;
        }
        if let Some(number) = self.job.take() {
            JobHandle::new(self.jobs.clone(), number).terminate().await;
        }
        for kind in [ResourceKind::Reservation, ResourceKind::Template] {
            if self.resources.holds(kind) {
                self.resources.mark(kind, false);
                report.delete(&self.compute, kind, &label, true).await;
            }
        }
        report
    }
}
