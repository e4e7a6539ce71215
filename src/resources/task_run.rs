//! The `TaskRun` kind: one execution of a task, with status and results.

use std::time::Duration;

use kube::api::ApiResource;
use kube::core::GroupVersionKind;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::resources::{PIPELINE_GROUP, PIPELINE_VERSION};

/// Condition type the orchestrator sets once a run has an outcome.
pub const CONDITION_SUCCEEDED: &str = "Succeeded";

/// A single execution of a [`Task`](crate::resources::Task).
///
/// The harness creates these with an empty status and polls them until the
/// `Succeeded` condition settles to `True` or `False`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: TaskRunSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskRunStatus>,
}

/// Spec of a [`TaskRun`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunSpec {
    /// The task to execute.
    #[serde(rename = "taskRef")]
    pub task_ref: TaskRef,

    /// Server-side deadline for the run, e.g. `"5m"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Bindings for the task's input and output slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<RunResources>,
}

/// Reference to the task a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    pub name: String,
}

/// The resource bindings of a run, mirroring the task's slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ResourceBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<ResourceBinding>,
}

/// Binds a named task slot to a concrete `PipelineResource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// Slot name declared on the task.
    pub name: String,
    /// The resource bound into the slot.
    #[serde(rename = "resourceRef")]
    pub resource_ref: ResourceRef,
}

/// Reference to a `PipelineResource` by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
}

/// Observed state of a [`TaskRun`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRunStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(
        rename = "startTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Time>,

    #[serde(
        rename = "completionTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub completion_time: Option<Time>,

    /// Pod the orchestrator scheduled for this run.
    #[serde(rename = "podName", default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,

    /// Key/value results reported by the run's resources, e.g. the digest
    /// of a pushed image or the commit a git source resolved to.
    #[serde(
        rename = "resourcesResult",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub resources_result: Vec<ResourceResult>,
}

/// One entry under `status.resourcesResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResult {
    pub key: String,
    pub value: String,
    /// Name of the resource that produced the entry. The server is expected
    /// to fill this in; an empty value is a reporting bug.
    #[serde(rename = "resourceName", default)]
    pub resource_name: String,
}

/// A status condition, matching the common Kubernetes shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// `"True"`, `"False"`, or `"Unknown"`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskRun {
    /// Parses a `TaskRun` from a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Manifest`] if the document does not match the
    /// expected shape.
    pub fn from_yaml(manifest: &str) -> Result<Self, HarnessError> {
        serde_yaml::from_str(manifest).map_err(|source| HarnessError::Manifest {
            kind: "TaskRun",
            source,
        })
    }

    /// Dynamic-API descriptor for this kind.
    pub fn api_resource() -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(PIPELINE_GROUP, PIPELINE_VERSION, "TaskRun"),
            "taskruns",
        )
    }

    /// The `Succeeded` condition, if the server has reported one.
    pub fn succeeded_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.condition_type == CONDITION_SUCCEEDED)
    }

    /// Whether the run completed successfully.
    pub fn is_succeeded(&self) -> bool {
        self.succeeded_condition()
            .map(|c| c.status == "True")
            .unwrap_or(false)
    }

    /// Whether the run completed with a failure.
    pub fn is_failed(&self) -> bool {
        self.succeeded_condition()
            .map(|c| c.status == "False")
            .unwrap_or(false)
    }

    /// Whether the run has reached a terminal state either way.
    pub fn is_done(&self) -> bool {
        self.is_succeeded() || self.is_failed()
    }

    /// The result entry with the given key, if reported.
    pub fn result(&self, key: &str) -> Option<&ResourceResult> {
        self.status
            .as_ref()?
            .resources_result
            .iter()
            .find(|r| r.key == key)
    }
}

impl TaskRunStatus {
    /// Wall-clock duration of the run, when both timestamps are reported.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.start_time.as_ref()?;
        let end = self.completion_time.as_ref()?;
        Some(end.0 - start.0)
    }
}

/// Parses a duration in the compact form used by run timeouts, e.g. `"5m"`,
/// `"90s"`, or `"1h30m"`.
///
/// # Errors
///
/// Returns an error for empty input, unknown units, or missing digits.
pub fn parse_timeout(input: &str) -> Result<Duration, HarnessError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(HarnessError::other("empty timeout"));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut saw_component = false;

    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| HarnessError::other(format!("invalid timeout {:?}", input)))?;
        digits.clear();
        saw_component = true;
        total += match c {
            'h' => Duration::from_secs(value * 3600),
            'm' => Duration::from_secs(value * 60),
            's' => Duration::from_secs(value),
            _ => {
                return Err(HarnessError::other(format!(
                    "invalid timeout {:?}: unknown unit {:?}",
                    input, c
                )))
            }
        };
    }

    if !digits.is_empty() || !saw_component {
        return Err(HarnessError::other(format!(
            "invalid timeout {:?}: expected digits followed by h, m, or s",
            input
        )));
    }

    Ok(total)
}
