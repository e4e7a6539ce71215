//! Ephemeral container registry installed into a test namespace.
//!
//! Build scenarios push into a registry that lives and dies with the
//! namespace, reachable as `registry.<namespace>:5000` inside the cluster.
//! No TLS is configured; callers pass the registry to their tools with
//! verification disabled.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use tracing::debug;

use crate::client::ClusterClient;
use crate::error::HarnessError;

/// Name of the registry deployment, service, and DNS label.
pub const REGISTRY_NAME: &str = "registry";

/// Port the registry listens on.
pub const REGISTRY_PORT: i32 = 5000;

fn registry_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), REGISTRY_NAME.to_string())])
}

/// In-cluster hostname of a namespace's registry, e.g.
/// `registry.conveyor-e2e-abc123:5000`.
pub fn registry_host(namespace: &str) -> String {
    format!("{REGISTRY_NAME}.{namespace}:{REGISTRY_PORT}")
}

/// Builds the single-replica registry deployment.
pub fn registry_deployment(image: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(REGISTRY_NAME.to_string()),
            labels: Some(registry_labels()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(registry_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(registry_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: REGISTRY_NAME.to_string(),
                        image: Some(image.to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: REGISTRY_PORT,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the service that gives the registry its stable DNS name.
pub fn registry_service() -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(REGISTRY_NAME.to_string()),
            labels: Some(registry_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(registry_labels()),
            ports: Some(vec![ServicePort {
                port: REGISTRY_PORT,
                target_port: Some(IntOrString::Int(REGISTRY_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Installs the registry deployment and service into a namespace.
///
/// # Errors
///
/// Returns [`HarnessError::Api`] if either object cannot be created.
pub async fn install_registry(
    client: &dyn ClusterClient,
    namespace: &str,
    image: &str,
) -> Result<(), HarnessError> {
    client
        .create_deployment(namespace, &registry_deployment(image))
        .await?;
    client.create_service(namespace, &registry_service()).await?;
    debug!(namespace, host = %registry_host(namespace), "registry installed");
    Ok(())
}
