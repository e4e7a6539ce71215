//! Cluster access behind a trait.
//!
//! Scenarios talk to the cluster only through [`ClusterClient`], so the
//! same scenario code runs against a real cluster ([`KubeCluster`]) in e2e
//! runs and against a scripted [`MockCluster`] in unit tests.

pub mod kube;
pub mod mock;

pub use self::kube::KubeCluster;
pub use self::mock::{CreatedObject, MockCluster};

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};

use crate::error::HarnessError;
use crate::resources::{PipelineResource, Task, TaskRun};

/// The cluster operations a scenario needs.
///
/// Every method takes an explicit namespace; nothing here carries implicit
/// state beyond the connection itself.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError>;

    /// Deletes a namespace, succeeding if it is already gone.
    async fn delete_namespace(&self, name: &str) -> Result<(), HarnessError>;

    /// Lists namespace names matching a label selector.
    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<String>, HarnessError>;

    async fn create_pipeline_resource(
        &self,
        namespace: &str,
        resource: &PipelineResource,
    ) -> Result<(), HarnessError>;

    async fn create_task(&self, namespace: &str, task: &Task) -> Result<(), HarnessError>;

    async fn create_task_run(&self, namespace: &str, run: &TaskRun) -> Result<(), HarnessError>;

    /// Fetches a run with its current status.
    async fn get_task_run(&self, namespace: &str, name: &str) -> Result<TaskRun, HarnessError>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), HarnessError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, HarnessError>;

    /// Fetches the logs of one container in a pod.
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<String, HarnessError>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), HarnessError>;

    async fn create_service(&self, namespace: &str, service: &Service)
        -> Result<(), HarnessError>;
}
