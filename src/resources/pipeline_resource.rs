//! The `PipelineResource` kind: typed inputs and outputs for tasks.

use kube::api::ApiResource;
use kube::core::GroupVersionKind;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::resources::{RESOURCE_GROUP, RESOURCE_VERSION};

/// A typed artifact consumed or produced by a task.
///
/// The orchestrator resolves resources by name when a `TaskRun` binds them;
/// the harness only declares them and never reads their status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResource {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: PipelineResourceSpec,
}

/// Spec of a [`PipelineResource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResourceSpec {
    /// What the resource represents.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Type-specific settings, e.g. `url` and `revision` for a git source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
}

/// The flavour of a [`PipelineResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A git repository, parameterized by `url` and `revision`.
    Git,
    /// A container image, parameterized by `url`.
    Image,
}

/// A single name/value setting on a resource spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl PipelineResource {
    /// Parses a `PipelineResource` from a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Manifest`] if the document does not match the
    /// expected shape.
    pub fn from_yaml(manifest: &str) -> Result<Self, HarnessError> {
        serde_yaml::from_str(manifest).map_err(|source| HarnessError::Manifest {
            kind: "PipelineResource",
            source,
        })
    }

    /// Returns the parameter named `name`, if declared.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.spec
            .params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Dynamic-API descriptor for this kind.
    pub fn api_resource() -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(RESOURCE_GROUP, RESOURCE_VERSION, "PipelineResource"),
            "pipelineresources",
        )
    }
}
