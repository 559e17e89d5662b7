//! Compute Engine implementation of the compute facade.
//!
//! Resources are created through the Compute Engine REST API, authenticated
//! with the host's default service account token from the metadata server.
//! Every create waits for its long-running operation; deletes wait only when
//! asked to. A create whose insert was accepted but whose operation cannot be
//! confirmed is deleted again before the error is returned.

use reqwest::RequestBuilder;
use reqwest::header::CONTENT_LENGTH;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

mod api;
mod error;
mod metadata;

pub use api::MachineShape;
pub use error::GoogleComputeError;
pub use metadata::{METADATA_ROOT, MetadataServer};

use crate::compute::{Compute, ComputeFuture, HostIdentity, InstanceRequest, TemplateRequest};
use api::{Instance, InstanceTemplate, NameList, Operation, Placement, Reservation, StoredTemplate};

/// Root of the Compute Engine v1 REST API.
pub const COMPUTE_ROOT: &str = "https://compute.googleapis.com/compute/v1";

const NETWORK_ROOT: &str = "https://www.googleapis.com/compute/v1";
const OPERATION_DONE: &str = "DONE";

#[derive(Clone, Copy, Debug)]
enum Scope {
    Global,
    Zonal,
}

#[derive(Clone, Copy, Debug)]
struct Created {
    create: &'static str,
    delete: &'static str,
}

impl Created {
    const TEMPLATE: Self = Self {
        create: "create template",
        delete: "delete template",
    };
    const RESERVATION: Self = Self {
        create: "create reservation",
        delete: "delete reservation",
    };
    const INSTANCE: Self = Self {
        create: "create instance",
        delete: "delete instance",
    };
}

/// Compute Engine collaborator bound to the current host's project and zone.
#[derive(Clone, Debug)]
pub struct GoogleCompute {
    http: reqwest::Client,
    api: String,
    metadata: MetadataServer,
    identity: HostIdentity,
    shape: MachineShape,
}

impl GoogleCompute {
    /// Connects to the production endpoints and resolves the host identity.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleComputeError::Metadata`] when the host identity cannot
    /// be read, typically because the process is not running on GCE.
    pub async fn connect(shape: MachineShape) -> Result<Self, GoogleComputeError> {
        Self::with_endpoints(COMPUTE_ROOT, MetadataServer::default(), shape).await
    }

    /// Connects to explicit endpoints and resolves the host identity.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleComputeError::Metadata`] when the host identity cannot
    /// be read.
    pub async fn with_endpoints(
        api: &str,
        metadata: MetadataServer,
        shape: MachineShape,
    ) -> Result<Self, GoogleComputeError> {
        let identity = metadata.identity().await?;
        Ok(Self {
            http: reqwest::Client::new(),
            api: api.trim_end_matches('/').to_owned(),
            metadata,
            identity,
            shape,
        })
    }

    /// Metadata server used for identity, tokens and licenses.
    #[must_use]
    pub const fn metadata(&self) -> &MetadataServer {
        &self.metadata
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/projects/{}/{path}", self.api, self.identity.project)
    }

    fn zone_url(&self, path: &str) -> String {
        self.project_url(&format!("zones/{}/{path}", self.identity.zone))
    }

    fn operation_url(&self, scope: Scope, name: &str) -> String {
        match scope {
            Scope::Global => self.project_url(&format!("global/operations/{name}/wait")),
            Scope::Zonal => self.zone_url(&format!("operations/{name}/wait")),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GoogleComputeError> {
        let token = self.metadata.access_token().await?;
        let transport = |err: reqwest::Error| GoogleComputeError::Transport {
            operation: operation.to_owned(),
            message: err.to_string(),
        };
        let response = request.bearer_auth(token).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GoogleComputeError::HttpStatus {
                operation: operation.to_owned(),
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&bytes).map_err(|err| GoogleComputeError::Decode {
            operation: operation.to_owned(),
            message: err.to_string(),
        })
    }

    async fn wait(
        &self,
        operation: &'static str,
        scope: Scope,
        started: Operation,
    ) -> Result<(), GoogleComputeError> {
        let mut current = started;
        loop {
            if current.status == OPERATION_DONE {
                return match current.error {
                    Some(errors) => Err(GoogleComputeError::Operation {
                        operation: operation.to_owned(),
                        message: errors.describe(),
                    }),
                    None => Ok(()),
                };
            }
            debug!(
                operation,
                name = %current.name,
                status = %current.status,
                "waiting on operation"
            );
            let url = self.operation_url(scope, &current.name);
            current = self
                .call(operation, self.http.post(url).header(CONTENT_LENGTH, "0"))
                .await?;
        }
    }

    async fn settle(
        &self,
        created: Created,
        scope: Scope,
        started: Operation,
        url: String,
    ) -> Result<(), GoogleComputeError> {
        let Err(err) = self.wait(created.create, scope, started).await else {
            return Ok(());
        };
        warn!(
            operation = created.create,
            error = %err,
            "insert accepted but not confirmed; deleting"
        );
        if let Err(cleanup) = self.delete(created.delete, scope, url, false).await {
            warn!(operation = created.delete, error = %cleanup, "cleanup delete failed");
        }
        Err(err)
    }

    async fn subnetwork(&self) -> Result<String, GoogleComputeError> {
        let region = self.identity.region();
        let filter = format!(
            "network = \"{NETWORK_ROOT}/projects/{}/global/networks/{}\"",
            self.identity.project, self.identity.network
        );
        let list: NameList = self
            .call(
                "list subnetworks",
                self.http
                    .get(self.project_url(&format!("regions/{region}/subnetworks")))
                    .query(&[("filter", filter)]),
            )
            .await?;
        list.items
            .into_iter()
            .next()
            .map(|subnet| subnet.name)
            .ok_or_else(|| GoogleComputeError::NoSubnetwork {
                network: self.identity.network.clone(),
                region,
            })
    }

    async fn create_template_inner(
        &self,
        request: &TemplateRequest,
    ) -> Result<(), GoogleComputeError> {
        let subnetwork = self.subnetwork().await?;
        let declaration =
            api::container_declaration(request).map_err(|err| GoogleComputeError::Decode {
                operation: String::from("create template"),
                message: err.to_string(),
            })?;
        let region = self.identity.region();
        let placement = Placement {
            project: &self.identity.project,
            region: &region,
            network: &self.identity.network,
            subnetwork: &subnetwork,
        };
        let body = InstanceTemplate::new(request, &self.shape, &placement, declaration);
        let started: Operation = self
            .call(
                "create template",
                self.http
                    .post(self.project_url("global/instanceTemplates"))
                    .json(&body),
            )
            .await?;
        let url = self.project_url(&format!("global/instanceTemplates/{}", request.name));
        self.settle(Created::TEMPLATE, Scope::Global, started, url).await?;
        info!(template = %request.name, "template created");
        Ok(())
    }

    async fn create_reservation_inner(
        &self,
        name: &str,
        template: &str,
    ) -> Result<(), GoogleComputeError> {
        let body = Reservation::new(name, &self.identity.project, template);
        let started: Operation = self
            .call(
                "create reservation",
                self.http.post(self.zone_url("reservations")).json(&body),
            )
            .await?;
        let url = self.zone_url(&format!("reservations/{name}"));
        self.settle(Created::RESERVATION, Scope::Zonal, started, url).await?;
        info!(reservation = %name, "reservation created");
        Ok(())
    }

    async fn create_instance_inner(
        &self,
        request: &InstanceRequest,
    ) -> Result<(), GoogleComputeError> {
        let stored: StoredTemplate = self
            .call(
                "read template",
                self.http.get(self.project_url(&format!(
                    "global/instanceTemplates/{}",
                    request.template
                ))),
            )
            .await?;
        let items = api::instance_metadata(
            stored.properties.metadata.items,
            request.job_number.as_deref(),
            &request.shutdown_script,
        );
        let body = Instance::new(&request.name, &request.reservation, items);
        let started: Operation = self
            .call(
                "create instance",
                self.http
                    .post(self.zone_url("instances"))
                    .query(&[(
                        "sourceInstanceTemplate",
                        api::template_path(&self.identity.project, &request.template),
                    )])
                    .json(&body),
            )
            .await?;
        let url = self.zone_url(&format!("instances/{}", request.name));
        self.settle(Created::INSTANCE, Scope::Zonal, started, url).await?;
        info!(instance = %request.name, "instance created");
        Ok(())
    }

    async fn delete(
        &self,
        operation: &'static str,
        scope: Scope,
        url: String,
        wait: bool,
    ) -> Result<(), GoogleComputeError> {
        let started: Operation = self.call(operation, self.http.delete(url)).await?;
        if wait {
            self.wait(operation, scope, started).await?;
            info!(operation, "deletion finished");
        } else {
            debug!(operation, name = %started.name, "deletion requested");
        }
        Ok(())
    }

    async fn instance_exists_inner(&self, name: &str) -> Result<bool, GoogleComputeError> {
        let list: NameList = self
            .call(
                "list instances",
                self.http
                    .get(self.zone_url("instances"))
                    .query(&[("filter", format!("name = \"{name}\""))]),
            )
            .await?;
        Ok(list.items.iter().any(|instance| instance.name == name))
    }
}

impl Compute for GoogleCompute {
    type Error = GoogleComputeError;

    fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    fn create_template<'a>(
        &'a self,
        request: &'a TemplateRequest,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(self.create_template_inner(request))
    }

    fn create_reservation<'a>(
        &'a self,
        name: &'a str,
        template: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(self.create_reservation_inner(name, template))
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(self.create_instance_inner(request))
    }

    fn delete_instance<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        let url = self.zone_url(&format!("instances/{name}"));
        Box::pin(self.delete("delete instance", Scope::Zonal, url, wait))
    }

    fn delete_reservation<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        let url = self.zone_url(&format!("reservations/{name}"));
        Box::pin(self.delete("delete reservation", Scope::Zonal, url, wait))
    }

    fn delete_template<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        let url = self.project_url(&format!("global/instanceTemplates/{name}"));
        Box::pin(self.delete("delete template", Scope::Global, url, wait))
    }

    fn instance_exists<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, bool, Self::Error> {
        Box::pin(self.instance_exists_inner(name))
    }

    fn has_license<'a>(&'a self, license_id: &'a str) -> ComputeFuture<'a, bool, Self::Error> {
        Box::pin(self.metadata.has_license(license_id))
    }
}
