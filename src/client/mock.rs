//! Scripted in-memory [`ClusterClient`] for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, PodStatus, Service};

use crate::client::ClusterClient;
use crate::error::HarnessError;
use crate::resources::{PipelineResource, Task, TaskRun, TaskRunStatus};

/// A record of one object created through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedObject {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

#[derive(Default)]
struct MockState {
    run_statuses: VecDeque<Option<TaskRunStatus>>,
    pods: VecDeque<Pod>,
    container_logs: HashMap<String, String>,
    failures: HashMap<&'static str, String>,
    task_runs: HashMap<String, TaskRun>,
    created: Vec<CreatedObject>,
    namespaces: Vec<(String, BTreeMap<String, String>)>,
    deleted_namespaces: Vec<String>,
}

/// Scripted cluster double.
///
/// Statuses for `get_task_run` and pods for `get_pod` are queued up front;
/// each poll consumes one entry and the final entry repeats, so a wait loop
/// that polls more often than the script is long still settles. Failures
/// are injected per operation and fire once.
pub struct MockCluster {
    state: Mutex<MockState>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Queues a status for the next `get_task_run` call.
    pub fn push_run_status(&self, status: TaskRunStatus) {
        self.state
            .lock()
            .unwrap()
            .run_statuses
            .push_back(Some(status));
    }

    /// Queues a "no status yet" response for the next `get_task_run` call.
    pub fn push_run_pending(&self) {
        self.state.lock().unwrap().run_statuses.push_back(None);
    }

    /// Queues a pod whose only interesting field is its phase.
    pub fn push_pod_phase(&self, phase: &str) {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.state.lock().unwrap().pods.push_back(pod);
    }

    /// Sets the logs returned for a container, regardless of pod name.
    pub fn set_container_logs(&self, container: &str, logs: &str) {
        self.state
            .lock()
            .unwrap()
            .container_logs
            .insert(container.to_string(), logs.to_string());
    }

    /// Makes the named operation fail once with the given message.
    pub fn fail_once(&self, operation: &'static str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation, message.to_string());
    }

    /// Registers a pre-existing namespace for `list_namespaces`.
    pub fn add_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state
            .lock()
            .unwrap()
            .namespaces
            .push((name.to_string(), labels));
    }

    /// Everything created through the mock, in order.
    pub fn created_objects(&self) -> Vec<CreatedObject> {
        self.state.lock().unwrap().created.clone()
    }

    /// Namespaces deleted through the mock, in order.
    pub fn deleted_namespaces(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_namespaces.clone()
    }

    pub fn remaining_statuses(&self) -> usize {
        self.state.lock().unwrap().run_statuses.len()
    }

    fn take_failure(&self, operation: &'static str) -> Option<HarnessError> {
        self.state
            .lock()
            .unwrap()
            .failures
            .remove(operation)
            .map(HarnessError::other)
    }

    fn record(&self, kind: &'static str, namespace: &str, name: Option<&String>) {
        self.state.lock().unwrap().created.push(CreatedObject {
            kind,
            namespace: namespace.to_string(),
            name: name.cloned().unwrap_or_default(),
        });
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|pair| {
        match pair.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => false,
        }
    })
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_namespace") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state
            .namespaces
            .push((name.to_string(), labels.clone()));
        state.created.push(CreatedObject {
            kind: "Namespace",
            namespace: String::new(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("delete_namespace") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.namespaces.retain(|(n, _)| n != name);
        state.deleted_namespaces.push(name.to_string());
        Ok(())
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<String>, HarnessError> {
        if let Some(err) = self.take_failure("list_namespaces") {
            return Err(err);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .namespaces
            .iter()
            .filter(|(_, labels)| selector_matches(label_selector, labels))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn create_pipeline_resource(
        &self,
        namespace: &str,
        resource: &PipelineResource,
    ) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_pipeline_resource") {
            return Err(err);
        }
        self.record("PipelineResource", namespace, resource.metadata.name.as_ref());
        Ok(())
    }

    async fn create_task(&self, namespace: &str, task: &Task) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_task") {
            return Err(err);
        }
        self.record("Task", namespace, task.metadata.name.as_ref());
        Ok(())
    }

    async fn create_task_run(&self, namespace: &str, run: &TaskRun) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_task_run") {
            return Err(err);
        }
        self.record("TaskRun", namespace, run.metadata.name.as_ref());
        if let Some(name) = &run.metadata.name {
            self.state
                .lock()
                .unwrap()
                .task_runs
                .insert(name.clone(), run.clone());
        }
        Ok(())
    }

    async fn get_task_run(&self, namespace: &str, name: &str) -> Result<TaskRun, HarnessError> {
        if let Some(err) = self.take_failure("get_task_run") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        let mut run = state
            .task_runs
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::NotFound {
                object: format!("taskrun {name}"),
                namespace: namespace.to_string(),
            })?;
        run.status = match state.run_statuses.len() {
            0 => None,
            1 => state.run_statuses.front().cloned().flatten(),
            _ => state.run_statuses.pop_front().flatten(),
        };
        Ok(run)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_pod") {
            return Err(err);
        }
        self.record("Pod", namespace, pod.metadata.name.as_ref());
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, HarnessError> {
        if let Some(err) = self.take_failure("get_pod") {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        let mut pod = match state.pods.len() {
            0 => {
                return Err(HarnessError::NotFound {
                    object: format!("pod {name}"),
                    namespace: namespace.to_string(),
                })
            }
            1 => state.pods.front().cloned().unwrap(),
            _ => state.pods.pop_front().unwrap(),
        };
        pod.metadata.name = Some(name.to_string());
        Ok(pod)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<String, HarnessError> {
        if let Some(err) = self.take_failure("pod_logs") {
            return Err(err);
        }
        let _ = namespace;
        self.state
            .lock()
            .unwrap()
            .container_logs
            .get(container)
            .cloned()
            .ok_or_else(|| HarnessError::LogsUnavailable {
                pod: pod.to_string(),
                container: container.to_string(),
                detail: "no logs scripted".to_string(),
            })
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_deployment") {
            return Err(err);
        }
        self.record("Deployment", namespace, deployment.metadata.name.as_ref());
        Ok(())
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<(), HarnessError> {
        if let Some(err) = self.take_failure("create_service") {
            return Err(err);
        }
        self.record("Service", namespace, service.metadata.name.as_ref());
        Ok(())
    }
}

impl std::fmt::Debug for MockCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCluster")
            .field("remaining_statuses", &self.remaining_statuses())
            .finish()
    }
}
