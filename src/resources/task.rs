//! The `Task` kind: a reusable definition of build steps.

use kube::api::ApiResource;
use kube::core::GroupVersionKind;

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::resources::pipeline_resource::ResourceType;
use crate::resources::{PIPELINE_GROUP, PIPELINE_VERSION};

/// A build definition the orchestrator can execute.
///
/// Steps are plain containers run in order inside the task pod; sidecars
/// run alongside them for the lifetime of the pod. The local registry a
/// build pushes to is modelled as a sidecar so pushes never leave the pod's
/// network namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: TaskSpec,
}

/// Spec of a [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Typed slots the task consumes and produces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<TaskResources>,

    /// Containers run in order.
    pub steps: Vec<Container>,

    /// Containers run alongside the steps for the pod's lifetime.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<Container>,
}

/// The input and output slots of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ResourceSlot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<ResourceSlot>,
}

/// A named, typed slot a `TaskRun` binds a resource into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

impl Task {
    /// Parses a `Task` from a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Manifest`] if the document does not match the
    /// expected shape.
    pub fn from_yaml(manifest: &str) -> Result<Self, HarnessError> {
        serde_yaml::from_str(manifest).map_err(|source| HarnessError::Manifest {
            kind: "Task",
            source,
        })
    }

    /// Dynamic-API descriptor for this kind.
    pub fn api_resource() -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(PIPELINE_GROUP, PIPELINE_VERSION, "Task"),
            "tasks",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD_TASK: &str = r#"
apiVersion: conveyor.dev/v1beta1
kind: Task
metadata:
  name: image-build
spec:
  resources:
    inputs:
    - name: gitsource
      type: git
    outputs:
    - name: builtImage
      type: image
  steps:
  - name: build-and-push
    image: gcr.io/kaniko-project/executor:v1.23.2
    args:
    - --context=/workspace/gitsource
    - --destination=registry.example:5000/built
    securityContext:
      runAsUser: 0
  sidecars:
  - name: registry
    image: registry:2
"#;

    #[test]
    fn parses_build_task_manifest() {
        let task = Task::from_yaml(BUILD_TASK).unwrap();

        let resources = task.spec.resources.as_ref().unwrap();
        assert_eq!(resources.inputs.len(), 1);
        assert_eq!(resources.inputs[0].name, "gitsource");
        assert_eq!(resources.inputs[0].resource_type, ResourceType::Git);
        assert_eq!(resources.outputs[0].name, "builtImage");
        assert_eq!(resources.outputs[0].resource_type, ResourceType::Image);

        assert_eq!(task.spec.steps.len(), 1);
        let step = &task.spec.steps[0];
        assert_eq!(step.name, "build-and-push");
        assert_eq!(
            step.security_context
                .as_ref()
                .and_then(|sc| sc.run_as_user),
            Some(0)
        );

        assert_eq!(task.spec.sidecars.len(), 1);
        assert_eq!(task.spec.sidecars[0].image.as_deref(), Some("registry:2"));
    }

    #[test]
    fn task_without_resources_or_sidecars_parses() {
        let manifest = r#"
metadata:
  name: lint
spec:
  steps:
  - name: lint
    image: golangci/golangci-lint:v1.55
"#;
        let task = Task::from_yaml(manifest).unwrap();
        assert!(task.spec.resources.is_none());
        assert!(task.spec.sidecars.is_empty());
    }

    #[test]
    fn rejects_task_without_steps() {
        let manifest = r#"
metadata:
  name: empty
spec: {}
"#;
        assert!(Task::from_yaml(manifest).is_err());
    }

    #[test]
    fn api_resource_targets_pipeline_group() {
        let ar = Task::api_resource();
        assert_eq!(ar.group, "conveyor.dev");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.kind, "Task");
        assert_eq!(ar.plural, "tasks");
    }
}
