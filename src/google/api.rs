//! Compute Engine REST payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compute::{JOB_ID_PLACEHOLDER, TemplateRequest};

/// Metadata key holding the container declaration of a container VM.
pub const CONTAINER_DECLARATION_KEY: &str = "gce-container-declaration";
/// Metadata key holding the script run when the instance stops.
pub const SHUTDOWN_SCRIPT_KEY: &str = "shutdown-script";

const LOGGING_KEY: &str = "google-logging-enabled";
const CONTAINER_LABEL: &str = "container-vm";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const RESERVATION_AFFINITY_KEY: &str = "compute.googleapis.com/reservation-name";
const LABEL_VALUE_MAX: usize = 63;

/// Machine shape shared by every template the collaborator creates.
///
/// The empty default suits callers that only delete resources.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MachineShape {
    /// Compute Engine machine type (for example `n1-standard-8`).
    pub machine_type: String,
    /// Project hosting the boot image.
    pub image_project: String,
    /// Boot image name.
    pub image: String,
    /// Boot disk size in GiB.
    pub disk_size_gb: u32,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub(super) struct MetadataItem {
    pub(super) key: String,
    #[serde(default)]
    pub(super) value: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(super) struct Metadata {
    #[serde(default)]
    pub(super) items: Vec<MetadataItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InstanceTemplate {
    name: String,
    description: &'static str,
    properties: InstanceProperties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceProperties {
    machine_type: String,
    can_ip_forward: bool,
    disks: Vec<AttachedDisk>,
    network_interfaces: Vec<NetworkInterface>,
    scheduling: Scheduling,
    service_accounts: Vec<ServiceAccount>,
    shielded_instance_config: ShieldedInstanceConfig,
    labels: BTreeMap<&'static str, String>,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachedDisk {
    auto_delete: bool,
    boot: bool,
    device_name: &'static str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    initialize_params: InitializeParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    source_image: String,
    disk_size_gb: String,
    disk_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    name: &'static str,
    network: String,
    subnetwork: String,
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    name: &'static str,
    network_tier: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Scheduling {
    automatic_restart: bool,
    on_host_maintenance: &'static str,
    preemptible: bool,
    provisioning_model: &'static str,
}

#[derive(Debug, Serialize)]
struct ServiceAccount {
    email: String,
    scopes: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShieldedInstanceConfig {
    enable_secure_boot: bool,
    enable_vtpm: bool,
    enable_integrity_monitoring: bool,
}

/// Network placement of the template's single interface.
pub(super) struct Placement<'a> {
    pub(super) project: &'a str,
    pub(super) region: &'a str,
    pub(super) network: &'a str,
    pub(super) subnetwork: &'a str,
}

impl InstanceTemplate {
    pub(super) fn new(
        request: &TemplateRequest,
        shape: &MachineShape,
        placement: &Placement<'_>,
        declaration: String,
    ) -> Self {
        let Placement {
            project,
            region,
            network,
            subnetwork,
        } = placement;
        Self {
            name: request.name.clone(),
            description: "batch job meter template",
            properties: InstanceProperties {
                machine_type: shape.machine_type.clone(),
                can_ip_forward: false,
                disks: vec![AttachedDisk {
                    auto_delete: true,
                    boot: true,
                    device_name: "persistent-disk-0",
                    mode: "READ_WRITE",
                    kind: "PERSISTENT",
                    initialize_params: InitializeParams {
                        source_image: format!(
                            "projects/{}/global/images/{}",
                            shape.image_project, shape.image
                        ),
                        disk_size_gb: shape.disk_size_gb.to_string(),
                        disk_type: "pd-balanced",
                    },
                }],
                network_interfaces: vec![NetworkInterface {
                    name: "nic0",
                    network: format!("projects/{project}/global/networks/{network}"),
                    subnetwork: format!(
                        "projects/{project}/regions/{region}/subnetworks/{subnetwork}"
                    ),
                    access_configs: vec![AccessConfig {
                        name: "external-nat",
                        network_tier: "PREMIUM",
                        kind: "ONE_TO_ONE_NAT",
                    }],
                }],
                scheduling: Scheduling {
                    automatic_restart: true,
                    on_host_maintenance: "MIGRATE",
                    preemptible: false,
                    provisioning_model: "STANDARD",
                },
                service_accounts: vec![ServiceAccount {
                    email: request.service_account.clone(),
                    scopes: vec![CLOUD_PLATFORM_SCOPE],
                }],
                shielded_instance_config: ShieldedInstanceConfig {
                    enable_secure_boot: false,
                    enable_vtpm: true,
                    enable_integrity_monitoring: true,
                },
                labels: BTreeMap::from([(CONTAINER_LABEL, label_value(&shape.image))]),
                metadata: Metadata {
                    items: vec![
                        MetadataItem {
                            key: CONTAINER_DECLARATION_KEY.to_owned(),
                            value: declaration,
                        },
                        MetadataItem {
                            key: LOGGING_KEY.to_owned(),
                            value: String::from("true"),
                        },
                    ],
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Reservation {
    name: String,
    description: &'static str,
    specific_reservation_required: bool,
    share_settings: ShareSettings,
    specific_reservation: SpecificReservation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareSettings {
    share_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpecificReservation {
    count: String,
    source_instance_template: String,
}

impl Reservation {
    pub(super) fn new(name: &str, project: &str, template: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: "batch job reservation",
            specific_reservation_required: true,
            share_settings: ShareSettings { share_type: "LOCAL" },
            specific_reservation: SpecificReservation {
                count: String::from("1"),
                source_instance_template: template_path(project, template),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Instance {
    name: String,
    reservation_affinity: ReservationAffinity,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReservationAffinity {
    consume_reservation_type: &'static str,
    key: &'static str,
    values: Vec<String>,
}

impl Instance {
    pub(super) fn new(name: &str, reservation: &str, items: Vec<MetadataItem>) -> Self {
        Self {
            name: name.to_owned(),
            reservation_affinity: ReservationAffinity {
                consume_reservation_type: "SPECIFIC_RESERVATION",
                key: RESERVATION_AFFINITY_KEY,
                values: vec![reservation.to_owned()],
            },
            metadata: Metadata { items },
        }
    }
}

/// Template body as returned by `instanceTemplates.get`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct StoredTemplate {
    #[serde(default)]
    pub(super) properties: StoredProperties,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct StoredProperties {
    #[serde(default)]
    pub(super) metadata: Metadata,
}

/// Long-running operation handle.
#[derive(Debug, Deserialize)]
pub(super) struct Operation {
    pub(super) name: String,
    #[serde(default)]
    pub(super) status: String,
    #[serde(default)]
    pub(super) error: Option<OperationErrors>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OperationErrors {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl OperationErrors {
    pub(super) fn describe(&self) -> String {
        self.errors
            .iter()
            .map(|item| format!("{}: {}", item.code, item.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Page of a list call; only names are needed.
#[derive(Debug, Default, Deserialize)]
pub(super) struct NameList {
    #[serde(default)]
    pub(super) items: Vec<Named>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Named {
    pub(super) name: String,
}

#[derive(Debug, Serialize)]
struct ContainerDeclaration<'a> {
    spec: ContainerSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerSpec<'a> {
    containers: Vec<Container<'a>>,
    restart_policy: &'static str,
}

#[derive(Debug, Serialize)]
struct Container<'a> {
    name: &'a str,
    image: &'a str,
    command: Vec<&'a str>,
    args: &'a [String],
    stdin: bool,
    tty: bool,
}

/// Renders the container declaration for a template.
///
/// The declaration is JSON, which the container-optimised OS agent reads as
/// YAML.
pub(super) fn container_declaration(
    request: &TemplateRequest,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ContainerDeclaration {
        spec: ContainerSpec {
            containers: vec![Container {
                name: &request.name,
                image: &request.container_image,
                command: vec![request.container_command.as_str()],
                args: &request.container_args,
                stdin: false,
                tty: false,
            }],
            restart_policy: "Always",
        },
    })
}

/// Builds instance metadata from the template's items.
///
/// The shutdown script goes first; when a job number is known it replaces
/// the placeholder inside the container declaration.
pub(super) fn instance_metadata(
    template_items: Vec<MetadataItem>,
    job_number: Option<&str>,
    shutdown_script: &str,
) -> Vec<MetadataItem> {
    let mut items = vec![MetadataItem {
        key: SHUTDOWN_SCRIPT_KEY.to_owned(),
        value: shutdown_script.to_owned(),
    }];
    items.extend(template_items.into_iter().map(|item| match job_number {
        Some(number) if item.key == CONTAINER_DECLARATION_KEY => MetadataItem {
            value: item.value.replace(JOB_ID_PLACEHOLDER, number),
            key: item.key,
        },
        _ => item,
    }));
    items
}

/// Project-relative path of a global instance template.
pub(super) fn template_path(project: &str, template: &str) -> String {
    format!("projects/{project}/global/instanceTemplates/{template}")
}

/// Coerces an image name into a valid label value.
pub(super) fn label_value(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' || lower == '_' {
                lower
            } else {
                '-'
            }
        })
        .take(LABEL_VALUE_MAX)
        .collect()
}
