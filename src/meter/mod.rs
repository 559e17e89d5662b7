//! Self-watch unit running on the provisioned instance.
//!
//! The meter watches the job it was provisioned for and the controller that
//! provisioned it. When either goes away it terminates the job and deletes
//! the reservation, the template and finally the instance it runs on.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::compute::{Compute, ResourceKind, TeardownReport};
use crate::jobs::{JobError, JobHandle, JobNumber, JobService};
use crate::monitor::{WatchFuture, Watchable};

/// Errors raised while constructing a [`Meter`].
#[derive(Debug, Error)]
pub enum MeterError {
    /// Raised when the job-control credentials are rejected.
    #[error("job-control credentials rejected: {0}")]
    Auth(#[source] JobError),
}

/// Watches one job from the instance provisioned for it.
#[derive(Debug)]
pub struct Meter<S, C> {
    job: JobHandle<S>,
    compute: C,
    service_name: String,
    license_id: String,
    cleaned: bool,
}

impl<S, C> Meter<S, C>
where
    S: JobService,
    C: Compute,
{
    /// Verifies the job-control credentials and builds the meter.
    ///
    /// `service_name` names the controller instance; the meter stops once it
    /// disappears. `license_id` must be attached to this host for
    /// [`Watchable::init`] to succeed.
    ///
    /// # Errors
    ///
    /// Returns [`MeterError::Auth`] when the credential check fails.
    pub async fn connect(
        service: S,
        number: JobNumber,
        compute: C,
        service_name: String,
        license_id: String,
    ) -> Result<Self, MeterError> {
        service.check_auth().await.map_err(MeterError::Auth)?;
        Ok(Self {
            job: JobHandle::new(service, number),
            compute,
            service_name,
            license_id,
            cleaned: false,
        })
    }

    async fn init_inner(&mut self) -> bool {
        let license_id = self.license_id.as_str();
        match self.compute.has_license(license_id).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(license_id, "unable to verify license on this host");
                false
            }
            Err(err) => {
                warn!(license_id, error = %err, "license lookup failed");
                false
            }
        }
    }

    async fn running_inner(&mut self) -> bool {
        if !self.job.running().await {
            return false;
        }
        match self.compute.instance_exists(&self.service_name).await {
            Ok(true) => true,
            Ok(false) => {
                info!(service = %self.service_name, "controller instance is gone");
                false
            }
            Err(err) => {
                warn!(service = %self.service_name, error = %err, "controller lookup failed");
                false
            }
        }
    }

    async fn cleanup_inner(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        self.job.terminate().await;
        let host = self.compute.identity().name.clone();
        let mut report = TeardownReport::default();
        report
            .delete(&self.compute, ResourceKind::Reservation, &host, false)
            .await;
        report
            .delete(&self.compute, ResourceKind::Template, &host, false)
            .await;
        report
            .delete(&self.compute, ResourceKind::Instance, &host, true)
            .await;
        if !report.is_clean() {
            error!(
                label = %host,
                "unable to remove every Compute Engine object; verify manually that template, reservation and instance {host} are deleted"
            );
        }
    }
}

impl<S, C> Watchable for Meter<S, C>
where
    S: JobService,
    C: Compute,
{
    fn init(&mut self) -> WatchFuture<'_, bool> {
        Box::pin(self.init_inner())
    }

    fn running(&mut self) -> WatchFuture<'_, bool> {
        Box::pin(self.running_inner())
    }

    fn output(&mut self) -> WatchFuture<'_, ()> {
        Box::pin(std::future::ready(()))
    }

    fn exit_success(&mut self) -> WatchFuture<'_, bool> {
        Box::pin(self.job.exit_success())
    }

    fn cleanup(&mut self) -> WatchFuture<'_, ()> {
        Box::pin(self.cleanup_inner())
    }
}
