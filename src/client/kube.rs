//! Real cluster access through the Kubernetes API.
//!
//! Built-in kinds go through typed APIs; the orchestrator's custom kinds go
//! through the dynamic API with the descriptors each resource type exposes,
//! so the harness works against whatever cluster has the CRDs installed
//! without generating its own schema.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, LogParams, PostParams,
};
use kube::core::TypeMeta;
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::client::ClusterClient;
use crate::error::HarnessError;
use crate::resources::{PipelineResource, Task, TaskRun};

/// [`ClusterClient`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connects using the ambient kubeconfig or in-cluster environment.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Api`] if no usable configuration is found.
    pub async fn connect() -> Result<Self, HarnessError> {
        let client = Client::try_default().await?;
        info!("connected to cluster");
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, namespace: &str, ar: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, ar)
    }
}

/// Converts a typed resource into a [`DynamicObject`] for submission.
fn to_dynamic<T: Serialize>(resource: &T, ar: &ApiResource) -> Result<DynamicObject, HarnessError> {
    let mut data = serde_json::to_value(resource)?;
    let metadata: ObjectMeta = match data.as_object_mut().and_then(|m| m.remove("metadata")) {
        Some(raw) => serde_json::from_value(raw)?,
        None => ObjectMeta::default(),
    };
    Ok(DynamicObject {
        types: Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        }),
        metadata,
        data,
    })
}

/// Converts a fetched [`DynamicObject`] back into a typed resource.
fn from_dynamic<T: DeserializeOwned>(object: DynamicObject) -> Result<T, HarnessError> {
    let DynamicObject {
        metadata, mut data, ..
    } = object;
    if let Some(map) = data.as_object_mut() {
        map.insert("metadata".to_string(), serde_json::to_value(&metadata)?);
    }
    Ok(serde_json::from_value(data)?)
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.create(&PostParams::default(), &namespace).await?;
        info!(namespace = name, "created namespace");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), HarnessError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = name, "deleted namespace");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(namespace = name, "namespace already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<String>, HarnessError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = ListParams::default().labels(label_selector);
        let list = api.list(&params).await?;
        Ok(list.into_iter().filter_map(|ns| ns.metadata.name).collect())
    }

    async fn create_pipeline_resource(
        &self,
        namespace: &str,
        resource: &PipelineResource,
    ) -> Result<(), HarnessError> {
        let ar = PipelineResource::api_resource();
        let object = to_dynamic(resource, &ar)?;
        self.dynamic_api(namespace, &ar)
            .create(&PostParams::default(), &object)
            .await?;
        debug!(
            namespace,
            name = resource.metadata.name.as_deref().unwrap_or(""),
            "created pipeline resource"
        );
        Ok(())
    }

    async fn create_task(&self, namespace: &str, task: &Task) -> Result<(), HarnessError> {
        let ar = Task::api_resource();
        let object = to_dynamic(task, &ar)?;
        self.dynamic_api(namespace, &ar)
            .create(&PostParams::default(), &object)
            .await?;
        debug!(
            namespace,
            name = task.metadata.name.as_deref().unwrap_or(""),
            "created task"
        );
        Ok(())
    }

    async fn create_task_run(&self, namespace: &str, run: &TaskRun) -> Result<(), HarnessError> {
        let ar = TaskRun::api_resource();
        let object = to_dynamic(run, &ar)?;
        self.dynamic_api(namespace, &ar)
            .create(&PostParams::default(), &object)
            .await?;
        info!(
            namespace,
            name = run.metadata.name.as_deref().unwrap_or(""),
            "created task run"
        );
        Ok(())
    }

    async fn get_task_run(&self, namespace: &str, name: &str) -> Result<TaskRun, HarnessError> {
        let ar = TaskRun::api_resource();
        let object = self.dynamic_api(namespace, &ar).get(name).await?;
        from_dynamic(object)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), HarnessError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), pod).await?;
        debug!(
            namespace,
            name = pod.metadata.name.as_deref().unwrap_or(""),
            "created pod"
        );
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, HarnessError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<String, HarnessError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        api.logs(pod, &params)
            .await
            .map_err(|e| HarnessError::LogsUnavailable {
                pod: pod.to_string(),
                container: container.to_string(),
                detail: e.to_string(),
            })
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), HarnessError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), deployment).await?;
        Ok(())
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<(), HarnessError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), service).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{
        Condition, ResourceResult, TaskRef, TaskRunSpec, TaskRunStatus,
    };

    fn sample_run() -> TaskRun {
        TaskRun {
            metadata: ObjectMeta {
                name: Some("build-run".to_string()),
                ..Default::default()
            },
            spec: TaskRunSpec {
                task_ref: TaskRef {
                    name: "build".to_string(),
                },
                timeout: Some("5m".to_string()),
                resources: None,
            },
            status: None,
        }
    }

    #[test]
    fn to_dynamic_carries_type_and_metadata() {
        let run = sample_run();
        let object = to_dynamic(&run, &TaskRun::api_resource()).unwrap();

        let types = object.types.as_ref().unwrap();
        assert_eq!(types.api_version, "conveyor.dev/v1beta1");
        assert_eq!(types.kind, "TaskRun");
        assert_eq!(object.metadata.name.as_deref(), Some("build-run"));
        assert_eq!(object.data["spec"]["taskRef"]["name"], "build");
        // metadata lives on the object, not in the payload
        assert!(object.data.get("metadata").is_none());
    }

    #[test]
    fn from_dynamic_restores_typed_run_with_status() {
        let mut run = sample_run();
        run.status = Some(TaskRunStatus {
            conditions: vec![Condition {
                condition_type: "Succeeded".to_string(),
                status: "True".to_string(),
                reason: None,
                message: None,
            }],
            resources_result: vec![ResourceResult {
                key: "digest".to_string(),
                value: "sha256:abc".to_string(),
                resource_name: "built-image".to_string(),
            }],
            ..Default::default()
        });

        let object = to_dynamic(&run, &TaskRun::api_resource()).unwrap();
        let restored: TaskRun = from_dynamic(object).unwrap();

        assert_eq!(restored, run);
        assert!(restored.is_succeeded());
    }

    #[test]
    fn from_dynamic_rejects_wrong_shape() {
        let object = DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::json!({ "spec": { "unexpected": true } }),
        };
        assert!(from_dynamic::<TaskRun>(object).is_err());
    }
}
