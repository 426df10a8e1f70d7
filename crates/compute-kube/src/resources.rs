//! Typed manifests for the resources that make up one container
//!
//! Every container namespace holds exactly one of each:
//!
//! | Kind                  | Name        |
//! |-----------------------|-------------|
//! | Secret                | `ssh-keys`  |
//! | PersistentVolumeClaim | `storage`   |
//! | NetworkPolicy         | `isolation` |
//! | Pod                   | `container` |
//! | Service (LB)          | `lb`        |

use compute_core::{ClusterConfig, WorkloadPhase};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements, Secret,
    SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use crate::gateway::NamespaceOwner;

pub const SSH_SECRET_NAME: &str = "ssh-keys";
pub const AUTHORIZED_KEYS: &str = "authorized_keys";
pub const VOLUME_CLAIM_NAME: &str = "storage";
pub const NETWORK_POLICY_NAME: &str = "isolation";
pub const WORKLOAD_NAME: &str = "container";
pub const SERVICE_NAME: &str = "lb";

/// Mount point of the SSH secret inside the workload
pub const SSH_MOUNT_PATH: &str = "/root/.ssh";

/// Selector shared by the workload and its service
pub const APP_LABEL: (&str, &str) = ("app", "compute-container");

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "compute";
pub const USER_ID_LABEL: &str = "compute.io/user-id";
pub const CONTAINER_ID_LABEL: &str = "compute.io/container-id";

/// Ports published on the load balancer
pub const SERVICE_PORTS: &[(&str, i32)] = &[
    ("ssh", 22),
    ("http", 80),
    ("https", 443),
    ("dev-3000", 3000),
    ("dev-8080", 8080),
];

const SSH_SECRET_MODE: i32 = 0o600;

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn app_selector() -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.0.to_string(), APP_LABEL.1.to_string())])
}

pub fn namespace(name: &str, owner: &NamespaceOwner) -> Namespace {
    let labels = BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
        (USER_ID_LABEL.to_string(), owner.user_id.to_string()),
        (CONTAINER_ID_LABEL.to_string(), owner.container_id.clone()),
    ]);

    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn ssh_secret(namespace: &str, authorized_keys: &str) -> Secret {
    Secret {
        metadata: meta(SSH_SECRET_NAME, namespace),
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([(
            AUTHORIZED_KEYS.to_string(),
            authorized_keys.to_string(),
        )])),
        ..Default::default()
    }
}

pub fn volume_claim(namespace: &str, storage_gb: u32, cluster: &ClusterConfig) -> PersistentVolumeClaim {
    let requests = BTreeMap::from([(
        "storage".to_string(),
        Quantity(format!("{}Gi", storage_gb)),
    )]);

    PersistentVolumeClaim {
        metadata: meta(VOLUME_CLAIM_NAME, namespace),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: Some(cluster.storage_class.clone()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// All ingress allowed; egress allowed to DNS and to anything outside the private range
pub fn network_policy(namespace: &str, cluster: &ClusterConfig) -> NetworkPolicy {
    let dns = NetworkPolicyEgressRule {
        ports: Some(vec![NetworkPolicyPort {
            protocol: Some("UDP".to_string()),
            port: Some(IntOrString::Int(53)),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let internet = NetworkPolicyEgressRule {
        to: Some(vec![NetworkPolicyPeer {
            ip_block: Some(IPBlock {
                cidr: "0.0.0.0/0".to_string(),
                except: Some(vec![cluster.private_cidr.clone()]),
            }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    NetworkPolicy {
        metadata: meta(NETWORK_POLICY_NAME, namespace),
        spec: Some(NetworkPolicySpec {
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule::default()]),
            egress: Some(vec![dns, internet]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Single pod, always restarted, with the claim at the home mount and the SSH
/// secret mounted read-only
pub fn workload(namespace: &str, image: &str, memory_mb: u32, cluster: &ClusterConfig) -> Pod {
    let memory = BTreeMap::from([(
        "memory".to_string(),
        Quantity(format!("{}Mi", memory_mb)),
    )]);

    let container = Container {
        name: "main".to_string(),
        image: Some(image.to_string()),
        resources: Some(ResourceRequirements {
            requests: Some(memory.clone()),
            limits: Some(memory),
            ..Default::default()
        }),
        ports: Some(vec![ContainerPort {
            name: Some("ssh".to_string()),
            container_port: 22,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: VOLUME_CLAIM_NAME.to_string(),
                mount_path: cluster.home_mount_path.clone(),
                ..Default::default()
            },
            VolumeMount {
                name: SSH_SECRET_NAME.to_string(),
                mount_path: SSH_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let volumes = vec![
        Volume {
            name: VOLUME_CLAIM_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: VOLUME_CLAIM_NAME.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: SSH_SECRET_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(SSH_SECRET_NAME.to_string()),
                default_mode: Some(SSH_SECRET_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    let mut metadata = meta(WORKLOAD_NAME, namespace);
    metadata.labels = Some(app_selector());

    Pod {
        metadata,
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: Some(volumes),
            restart_policy: Some("Always".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(namespace: &str) -> Service {
    let ports = SERVICE_PORTS
        .iter()
        .map(|(name, port)| ServicePort {
            name: Some(name.to_string()),
            port: *port,
            target_port: Some(IntOrString::Int(*port)),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: meta(SERVICE_NAME, namespace),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(app_selector()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// First load-balancer ingress IP, if one has been assigned
pub fn external_address(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?
        .ip
        .clone()
        .filter(|ip| !ip.is_empty())
}

pub fn workload_phase(pod: &Pod) -> WorkloadPhase {
    WorkloadPhase::from_pod_phase(pod.status.as_ref().and_then(|s| s.phase.as_deref()))
}
