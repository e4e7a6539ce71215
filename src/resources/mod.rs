//! Typed models for the orchestrator's resource kinds.
//!
//! The harness drives an externally-installed orchestrator, so these types
//! mirror the server's custom resources rather than generating a CRD
//! schema. Each kind deserializes from the YAML manifests the scenarios
//! render and serializes back for submission through the dynamic API.
//!
//! Three kinds are modelled:
//!
//! - [`PipelineResource`]: a typed input or output (git source, image)
//! - [`Task`]: a reusable build definition with steps and sidecars
//! - [`TaskRun`]: a single execution of a task, carrying status and results

pub mod pipeline_resource;
pub mod task;
pub mod task_run;

pub use pipeline_resource::{Param, PipelineResource, PipelineResourceSpec, ResourceType};
pub use task::{ResourceSlot, Task, TaskResources, TaskSpec};
pub use task_run::{
    parse_timeout, Condition, ResourceBinding, ResourceRef, ResourceResult, RunResources, TaskRef,
    TaskRun, TaskRunSpec, TaskRunStatus,
};

/// API group for pipeline kinds (`Task`, `TaskRun`).
pub const PIPELINE_GROUP: &str = "conveyor.dev";

/// API version for pipeline kinds.
pub const PIPELINE_VERSION: &str = "v1beta1";

/// API group for `PipelineResource`.
pub const RESOURCE_GROUP: &str = "resources.conveyor.dev";

/// API version for `PipelineResource`.
pub const RESOURCE_VERSION: &str = "v1alpha1";
