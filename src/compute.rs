//! Compute provider abstraction for the resources a batch run provisions.
//!
//! A run owns at most one instance template, one capacity reservation and one
//! instance, all named after the same label. The facade below is what the
//! provisioner and the meter talk to; [`crate::google::GoogleCompute`] is the
//! production implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::{info, warn};

/// Placeholder written into template metadata where the job number belongs.
///
/// The job number is only known after submission, while the template has to
/// exist before it; instance creation swaps the placeholder for the real
/// number.
pub const JOB_ID_PLACEHOLDER: &str = "TEMP_JOB_ID";

/// Identity of the host the current process is running on.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostIdentity {
    /// Project that owns the host.
    pub project: String,
    /// Zone short name (for example `us-central1-a`).
    pub zone: String,
    /// Network short name the primary interface is attached to.
    pub network: String,
    /// Instance name of the host.
    pub name: String,
    /// Provider assigned numeric instance identifier.
    pub id: String,
}

impl HostIdentity {
    /// Returns the region derived from the zone (`us-central1-a` →
    /// `us-central1`).
    #[must_use]
    pub fn region(&self) -> String {
        self.zone.split('-').take(2).collect::<Vec<_>>().join("-")
    }
}

/// Parameters for creating an instance template that runs a container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateRequest {
    /// Template name; the provisioning label.
    pub name: String,
    /// Service account attached to instances created from the template.
    pub service_account: String,
    /// Container image the instance runs.
    pub container_image: String,
    /// Entrypoint inside the container.
    pub container_command: String,
    /// Arguments passed to the entrypoint.
    pub container_args: Vec<String>,
}

/// Parameters for creating an instance from a template and reservation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Instance name; the provisioning label.
    pub name: String,
    /// Source template name.
    pub template: String,
    /// Reservation the instance consumes.
    pub reservation: String,
    /// Job number substituted for [`JOB_ID_PLACEHOLDER`] when present.
    pub job_number: Option<String>,
    /// Script run by the provider when the instance shuts down.
    pub shutdown_script: String,
}

/// Future returned by compute operations.
pub type ComputeFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Create/delete surface of the compute provider.
///
/// Every create either succeeds or leaves nothing the caller needs to track;
/// deletes are issued by name so they can be replayed from a bare label.
pub trait Compute: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Identity of the host this process runs on.
    fn identity(&self) -> &HostIdentity;

    /// Creates an instance template.
    fn create_template<'a>(
        &'a self,
        request: &'a TemplateRequest,
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Creates a single-instance capacity reservation bound to `template`.
    fn create_reservation<'a>(
        &'a self,
        name: &'a str,
        template: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Creates an instance from a template, consuming a reservation.
    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Deletes an instance; `wait` blocks until the provider finishes.
    fn delete_instance<'a>(&'a self, name: &'a str, wait: bool)
    -> ComputeFuture<'a, (), Self::Error>;

    /// Deletes a reservation; `wait` blocks until the provider finishes.
    fn delete_reservation<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error>;

    /// Deletes a template; `wait` blocks until the provider finishes.
    fn delete_template<'a>(&'a self, name: &'a str, wait: bool)
    -> ComputeFuture<'a, (), Self::Error>;

    /// Reports whether an instance with exactly this name exists.
    fn instance_exists<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, bool, Self::Error>;

    /// Reports whether the host carries the license with the given id.
    fn has_license<'a>(&'a self, license_id: &'a str) -> ComputeFuture<'a, bool, Self::Error>;
}

/// Kinds of resource a run creates, in creation order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    /// Instance template.
    Template,
    /// Capacity reservation.
    Reservation,
    /// Virtual machine instance.
    Instance,
}

impl ResourceKind {
    /// Issues the matching delete call on `compute`.
    pub fn delete<'a, C: Compute + ?Sized>(
        self,
        compute: &'a C,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), C::Error> {
        match self {
            Self::Template => compute.delete_template(name, wait),
            Self::Reservation => compute.delete_reservation(name, wait),
            Self::Instance => compute.delete_instance(name, wait),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Template => "template",
            Self::Reservation => "reservation",
            Self::Instance => "instance",
        })
    }
}

/// A delete that did not go through.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownFailure {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Provider error message.
    pub message: String,
}

/// Outcome of one best-effort teardown pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownReport {
    /// Resources whose delete call succeeded.
    pub deleted: Vec<ResourceKind>,
    /// Resources whose delete call failed.
    pub failed: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Returns `true` when no delete failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Deletes `name` as `kind`, logging and recording the outcome.
    pub async fn delete<C: Compute + ?Sized>(
        &mut self,
        compute: &C,
        kind: ResourceKind,
        name: &str,
        wait: bool,
    ) {
        match kind.delete(compute, name, wait).await {
            Ok(()) => {
                info!(resource = %kind, name, "deleted");
                self.deleted.push(kind);
            }
            Err(err) => {
                warn!(resource = %kind, name, error = %err, "delete failed");
                self.failed.push(TeardownFailure {
                    kind,
                    name: name.to_owned(),
                    message: err.to_string(),
                });
            }
        }
    }
}

/// Best-effort deletion of every resource named `label`, newest first.
///
/// Used when nothing but the label is known, for example after a crash.
pub async fn sweep_label<C: Compute + ?Sized>(compute: &C, label: &str) -> TeardownReport {
    let mut report = TeardownReport::default();
    report
        .delete(compute, ResourceKind::Instance, label, true)
        .await;
    report
        .delete(compute, ResourceKind::Reservation, label, true)
        .await;
    report
        .delete(compute, ResourceKind::Template, label, true)
        .await;
    report
}
