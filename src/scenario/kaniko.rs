//! Kaniko build scenario.
//!
//! Builds a pinned git revision with kaniko inside the cluster, pushes the
//! image to the namespace-local registry, and checks that the run reported
//! the commit it built and the digest it pushed. The digest is then
//! compared against what the registry itself reports.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::ClusterClient;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::names::object_name;
use crate::registry::registry_host;
use crate::resources::{parse_timeout, PipelineResource, ResourceResult, Task, TaskRun};
use crate::scenario::{CheckFailure, RemoteVerification, ScenarioReport};
use crate::verify::{Digest, RemoteImageInspector};
use crate::wait::wait_until;

/// Repository the scenario builds.
pub const KANIKO_GIT_URL: &str = "https://github.com/GoogleContainerTools/kaniko";

/// Pinned revision, so every run builds identical input.
pub const KANIKO_GIT_REVISION: &str = "a310cc6d1cd449f95cedd23393de766fdc649651";

/// Dockerfile within the repository checkout.
const DOCKERFILE_PATH: &str = "integration/dockerfiles/Dockerfile_test_label";

/// Image name pushed into the namespace-local registry.
const IMAGE_NAME: &str = "kanikotasktest";

/// Deadline written into the run manifest. The server enforces it, and the
/// client-side wait budget is parsed back out of the manifest so the two
/// can never drift apart.
const TASK_RUN_TIMEOUT: &str = "5m";

/// Wait budget when the manifest carries no parseable timeout.
const RUN_BUDGET: Duration = Duration::from_secs(5 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

const RESULT_DIGEST: &str = "digest";
const RESULT_COMMIT: &str = "commit";
const RESULT_URL: &str = "url";
const REQUIRED_RESULTS: [&str; 3] = [RESULT_DIGEST, RESULT_COMMIT, RESULT_URL];

/// Drives one kaniko build through the orchestrator.
pub struct KanikoBuildScenario {
    client: Arc<dyn ClusterClient>,
    config: HarnessConfig,
}

impl KanikoBuildScenario {
    pub fn new(client: Arc<dyn ClusterClient>, config: HarnessConfig) -> Self {
        Self { client, config }
    }

    /// Runs the scenario inside an already-provisioned namespace.
    ///
    /// Creation failures and verifier infrastructure failures return `Err`;
    /// everything the run got wrong is collected in the report instead.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when a resource cannot be created or the
    /// remote digest lookup itself breaks.
    pub async fn run(
        &self,
        inspector: &dyn RemoteImageInspector,
        namespace: &str,
    ) -> Result<ScenarioReport, HarnessError> {
        let repo = format!("{}/{}", registry_host(namespace), IMAGE_NAME);
        let mut failures = Vec::new();

        let git = git_resource(&object_name("kaniko-git"))?;
        let git_name = named(&git.metadata.name);
        info!(namespace, name = %git_name, "creating git pipeline resource");
        self.client.create_pipeline_resource(namespace, &git).await?;

        let image = image_resource(&object_name("kaniko-image"), &repo)?;
        let image_name = named(&image.metadata.name);
        info!(namespace, name = %image_name, repo, "creating image pipeline resource");
        self.client
            .create_pipeline_resource(namespace, &image)
            .await?;

        let task = build_task(
            &object_name("kaniko-build"),
            &repo,
            namespace,
            &self.config.kaniko_image,
            &self.config.registry_image,
        )?;
        let task_name = named(&task.metadata.name);
        info!(namespace, name = %task_name, "creating task");
        self.client.create_task(namespace, &task).await?;

        let task_run = build_task_run(
            &object_name("kaniko-build-run"),
            &task_name,
            &git_name,
            &image_name,
        )?;
        let run_name = named(&task_run.metadata.name);
        let budget = wait_budget(&task_run);
        info!(namespace, name = %run_name, "creating task run");
        self.client.create_task_run(namespace, &task_run).await?;

        // Wait for a terminal condition either way; diagnostics continue
        // past a timeout with whatever state is observable.
        let waited = wait_until("TaskRunSucceeded", budget, POLL_INTERVAL, || {
            let client = Arc::clone(&self.client);
            let namespace = namespace.to_string();
            let name = run_name.clone();
            async move {
                let run = client.get_task_run(&namespace, &name).await?;
                let done = run.is_done();
                Ok(done.then_some(run))
            }
        })
        .await;

        let waited = match waited {
            Ok(run) => Some(run),
            Err(e) => {
                warn!(namespace, name = %run_name, error = %e, "task run wait failed");
                failures.push(CheckFailure::WaitFailed {
                    detail: e.to_string(),
                });
                None
            }
        };

        let run = match self.client.get_task_run(namespace, &run_name).await {
            Ok(run) => Some(run),
            Err(e) => {
                failures.push(CheckFailure::FetchFailed {
                    detail: e.to_string(),
                });
                waited
            }
        };

        if let Some(elapsed) = run
            .as_ref()
            .and_then(|r| r.status.as_ref())
            .and_then(|s| s.duration())
        {
            info!(
                namespace,
                name = %run_name,
                seconds = elapsed.num_seconds(),
                "task run finished"
            );
        }

        if let Some(run) = &run {
            if run.is_failed() {
                let condition = run.succeeded_condition();
                failures.push(CheckFailure::RunFailed {
                    reason: condition
                        .and_then(|c| c.reason.clone())
                        .unwrap_or_default(),
                    message: condition
                        .and_then(|c| c.message.clone())
                        .unwrap_or_default(),
                });
            }
        }

        let results: Vec<ResourceResult> = run
            .as_ref()
            .and_then(|r| r.status.as_ref())
            .map(|s| s.resources_result.clone())
            .unwrap_or_default();

        for entry in &results {
            if entry.resource_name.is_empty() {
                failures.push(CheckFailure::UnnamedResult {
                    key: entry.key.clone(),
                });
            }
        }

        let value_of = |key: &str| {
            results
                .iter()
                .find(|r| r.key == key)
                .map(|r| r.value.clone())
                .filter(|v| !v.is_empty())
        };
        for key in REQUIRED_RESULTS {
            if value_of(key).is_none() {
                failures.push(CheckFailure::MissingResult { key });
            }
        }

        if let Some(commit) = value_of(RESULT_COMMIT) {
            if commit != KANIKO_GIT_REVISION {
                failures.push(CheckFailure::CommitMismatch {
                    expected: KANIKO_GIT_REVISION.to_string(),
                    actual: commit,
                });
            }
        }

        let succeeded = run.as_ref().map(TaskRun::is_succeeded).unwrap_or(false);
        let remote = if succeeded {
            let remote_digest = inspector.image_digest(namespace, &repo).await?;
            info!(namespace, remote = %remote_digest, "remote digest inspected");
            if let Some(reported) = value_of(RESULT_DIGEST) {
                match Digest::parse(&reported) {
                    Ok(local) if local != remote_digest => {
                        failures.push(CheckFailure::DigestMismatch {
                            reported: local.to_string(),
                            remote: remote_digest.to_string(),
                        });
                    }
                    Ok(_) => {}
                    Err(_) => {
                        failures.push(CheckFailure::MalformedDigest { value: reported });
                    }
                }
            }
            RemoteVerification::Compared {
                remote: remote_digest.to_string(),
            }
        } else {
            // nothing was pushed, so asking the registry would only fail
            let reason = if run.is_some() {
                "task run did not succeed"
            } else {
                "task run state unknown"
            };
            RemoteVerification::Skipped {
                reason: reason.to_string(),
            }
        };

        Ok(ScenarioReport {
            namespace: namespace.to_string(),
            task_run: run_name,
            results,
            failures,
            remote,
        })
    }
}

fn named(name: &Option<String>) -> String {
    name.clone().unwrap_or_default()
}

/// Client-side wait budget for a run, taken from the manifest's own timeout.
fn wait_budget(run: &TaskRun) -> Duration {
    run.spec
        .timeout
        .as_deref()
        .and_then(|timeout| parse_timeout(timeout).ok())
        .unwrap_or(RUN_BUDGET)
}

fn git_resource(name: &str) -> Result<PipelineResource, HarnessError> {
    PipelineResource::from_yaml(&format!(
        r#"
metadata:
  name: {name}
spec:
  type: git
  params:
  - name: Url
    value: {KANIKO_GIT_URL}
  - name: Revision
    value: {KANIKO_GIT_REVISION}
"#
    ))
}

fn image_resource(name: &str, repo: &str) -> Result<PipelineResource, HarnessError> {
    PipelineResource::from_yaml(&format!(
        r#"
metadata:
  name: {name}
spec:
  type: image
  params:
  - name: url
    value: {repo}
"#
    ))
}

fn build_task(
    name: &str,
    repo: &str,
    namespace: &str,
    kaniko_image: &str,
    registry_image: &str,
) -> Result<Task, HarnessError> {
    Task::from_yaml(&format!(
        r#"
metadata:
  name: {name}
spec:
  resources:
    inputs:
    - name: gitsource
      type: git
    outputs:
    - name: builtImage
      type: image
  steps:
  - name: kaniko
    image: {kaniko_image}
    args:
    - --dockerfile=/workspace/gitsource/{DOCKERFILE_PATH}
    - --destination={repo}
    - --context=/workspace/gitsource
    - --oci-layout-path=/workspace/output/builtImage
    - --insecure
    - --insecure-pull
    - --insecure-registry={host}/
    securityContext:
      runAsUser: 0
  sidecars:
  - name: registry
    image: {registry_image}
"#,
        host = registry_host(namespace),
    ))
}

fn build_task_run(
    name: &str,
    task: &str,
    git: &str,
    image: &str,
) -> Result<TaskRun, HarnessError> {
    TaskRun::from_yaml(&format!(
        r#"
metadata:
  name: {name}
spec:
  taskRef:
    name: {task}
  timeout: {TASK_RUN_TIMEOUT}
  resources:
    inputs:
    - name: gitsource
      resourceRef:
        name: {git}
    outputs:
    - name: builtImage
      resourceRef:
        name: {image}
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCluster;
    use crate::resources::{Condition, TaskRunStatus};
    use crate::verify::FixedInspector;

    const DIGEST: &str = "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";
    const OTHER_DIGEST: &str =
        "sha256:0000000000000000000000000000000000000000000000000000000000000000";

    fn config() -> HarnessConfig {
        HarnessConfig {
            skip_root_user_tests: false,
            namespace_prefix: "conveyor-e2e".to_string(),
            kaniko_image: "gcr.io/kaniko-project/executor:v1.23.2".to_string(),
            registry_image: "registry:2".to_string(),
            skopeo_image: "quay.io/skopeo/stable:latest".to_string(),
            log_level: "info".to_string(),
        }
    }

    fn scenario(mock: &Arc<MockCluster>) -> KanikoBuildScenario {
        KanikoBuildScenario::new(Arc::clone(mock) as Arc<dyn ClusterClient>, config())
    }

    fn condition(status: &str, reason: &str) -> Condition {
        Condition {
            condition_type: "Succeeded".to_string(),
            status: status.to_string(),
            reason: Some(reason.to_string()),
            message: None,
        }
    }

    fn entry(key: &str, value: &str, resource_name: &str) -> ResourceResult {
        ResourceResult {
            key: key.to_string(),
            value: value.to_string(),
            resource_name: resource_name.to_string(),
        }
    }

    fn success_status(results: Vec<ResourceResult>) -> TaskRunStatus {
        TaskRunStatus {
            conditions: vec![condition("True", "Completed")],
            resources_result: results,
            ..Default::default()
        }
    }

    fn full_results() -> Vec<ResourceResult> {
        vec![
            entry(RESULT_COMMIT, KANIKO_GIT_REVISION, "git-source"),
            entry(RESULT_URL, KANIKO_GIT_URL, "git-source"),
            entry(RESULT_DIGEST, DIGEST, "built-image"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_passes_every_check() {
        let mock = Arc::new(MockCluster::new());
        mock.push_run_pending();
        mock.push_run_status(TaskRunStatus {
            conditions: vec![condition("Unknown", "Running")],
            ..Default::default()
        });
        mock.push_run_status(success_status(full_results()));

        let inspector = FixedInspector::returning(Digest::parse(DIGEST).unwrap());
        let report = scenario(&mock)
            .run(&inspector, "conveyor-e2e-happy")
            .await
            .unwrap();

        assert!(report.passed(), "unexpected failures: {:?}", report.failures);
        assert_eq!(report.results.len(), 3);
        assert_eq!(
            report.remote,
            RemoteVerification::Compared {
                remote: DIGEST.to_string()
            }
        );

        let created = mock.created_objects();
        let kinds: Vec<&str> = created.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec!["PipelineResource", "PipelineResource", "Task", "TaskRun"]
        );
        assert!(created.iter().all(|o| o.namespace == "conveyor-e2e-happy"));
        assert!(created[0].name.starts_with("kaniko-git-"));
        assert!(created[3].name.starts_with("kaniko-build-run-"));
        assert_eq!(report.task_run, created[3].name);
    }

    #[tokio::test]
    async fn missing_and_unnamed_results_flagged_individually() {
        let mock = Arc::new(MockCluster::new());
        // digest entry lost its resource name, url entry missing entirely
        mock.push_run_status(success_status(vec![
            entry(RESULT_COMMIT, KANIKO_GIT_REVISION, "git-source"),
            entry(RESULT_DIGEST, DIGEST, ""),
        ]));

        let inspector = FixedInspector::returning(Digest::parse(DIGEST).unwrap());
        let report = scenario(&mock).run(&inspector, "ns").await.unwrap();

        assert!(report.failures.contains(&CheckFailure::UnnamedResult {
            key: RESULT_DIGEST.to_string()
        }));
        assert!(report
            .failures
            .contains(&CheckFailure::MissingResult { key: RESULT_URL }));
        // the digest itself still matched
        assert!(!report
            .failures
            .iter()
            .any(|f| matches!(f, CheckFailure::DigestMismatch { .. })));
    }

    #[tokio::test]
    async fn commit_mismatch_is_recorded_not_fatal() {
        let mock = Arc::new(MockCluster::new());
        mock.push_run_status(success_status(vec![
            entry(RESULT_COMMIT, "f00dfacecafef00dfacecafef00dfacecafe0000", "git-source"),
            entry(RESULT_URL, KANIKO_GIT_URL, "git-source"),
            entry(RESULT_DIGEST, DIGEST, "built-image"),
        ]));

        let inspector = FixedInspector::returning(Digest::parse(DIGEST).unwrap());
        let report = scenario(&mock).run(&inspector, "ns").await.unwrap();

        assert_eq!(
            report.failures,
            vec![CheckFailure::CommitMismatch {
                expected: KANIKO_GIT_REVISION.to_string(),
                actual: "f00dfacecafef00dfacecafef00dfacecafe0000".to_string(),
            }]
        );
        // diagnostics continued all the way to the remote comparison
        assert!(matches!(report.remote, RemoteVerification::Compared { .. }));
    }

    #[tokio::test]
    async fn digest_mismatch_is_detected() {
        let mock = Arc::new(MockCluster::new());
        mock.push_run_status(success_status(full_results()));

        let inspector = FixedInspector::returning(Digest::parse(OTHER_DIGEST).unwrap());
        let report = scenario(&mock).run(&inspector, "ns").await.unwrap();

        assert_eq!(
            report.failures,
            vec![CheckFailure::DigestMismatch {
                reported: DIGEST.to_string(),
                remote: OTHER_DIGEST.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn malformed_digest_is_flagged() {
        let mock = Arc::new(MockCluster::new());
        mock.push_run_status(success_status(vec![
            entry(RESULT_COMMIT, KANIKO_GIT_REVISION, "git-source"),
            entry(RESULT_URL, KANIKO_GIT_URL, "git-source"),
            entry(RESULT_DIGEST, "not-a-digest", "built-image"),
        ]));

        let inspector = FixedInspector::returning(Digest::parse(DIGEST).unwrap());
        let report = scenario(&mock).run(&inspector, "ns").await.unwrap();

        assert_eq!(
            report.failures,
            vec![CheckFailure::MalformedDigest {
                value: "not-a-digest".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn failed_run_skips_remote_verification() {
        let mock = Arc::new(MockCluster::new());
        mock.push_run_status(TaskRunStatus {
            conditions: vec![Condition {
                condition_type: "Succeeded".to_string(),
                status: "False".to_string(),
                reason: Some("BuildFailed".to_string()),
                message: Some("step kaniko exited 1".to_string()),
            }],
            ..Default::default()
        });

        // a failing inspector proves the remote query is never attempted
        let inspector = FixedInspector::failing("must not be called");
        let report = scenario(&mock).run(&inspector, "ns").await.unwrap();

        assert!(report.failures.contains(&CheckFailure::RunFailed {
            reason: "BuildFailed".to_string(),
            message: "step kaniko exited 1".to_string(),
        }));
        assert_eq!(
            report.remote,
            RemoteVerification::Skipped {
                reason: "task run did not succeed".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_is_soft_and_bounded() {
        let mock = Arc::new(MockCluster::new());
        mock.push_run_pending();

        let inspector = FixedInspector::failing("must not be called");
        let report = scenario(&mock).run(&inspector, "ns").await.unwrap();

        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f, CheckFailure::WaitFailed { .. })));
        for key in REQUIRED_RESULTS {
            assert!(report
                .failures
                .contains(&CheckFailure::MissingResult { key }));
        }
        assert!(matches!(report.remote, RemoteVerification::Skipped { .. }));
    }

    #[tokio::test]
    async fn resource_creation_failure_is_fatal() {
        let mock = Arc::new(MockCluster::new());
        mock.fail_once("create_pipeline_resource", "admission webhook denied");

        let inspector = FixedInspector::failing("unused");
        let err = scenario(&mock).run(&inspector, "ns").await.unwrap_err();
        assert!(err.to_string().contains("admission webhook denied"));
    }

    #[tokio::test]
    async fn run_creation_failure_is_fatal() {
        let mock = Arc::new(MockCluster::new());
        mock.fail_once("create_task_run", "quota exceeded");

        let inspector = FixedInspector::failing("unused");
        let err = scenario(&mock).run(&inspector, "ns").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn task_manifest_embeds_build_arguments() {
        let task = build_task(
            "kaniko-build-x",
            "registry.ns:5000/kanikotasktest",
            "ns",
            "gcr.io/kaniko-project/executor:v1.23.2",
            "registry:2",
        )
        .unwrap();

        let step = &task.spec.steps[0];
        assert_eq!(step.name, "kaniko");
        let args = step.args.as_ref().unwrap();
        assert!(args.contains(&format!("--dockerfile=/workspace/gitsource/{DOCKERFILE_PATH}")));
        assert!(args.contains(&"--destination=registry.ns:5000/kanikotasktest".to_string()));
        assert!(args.contains(&"--insecure-registry=registry.ns:5000/".to_string()));
        assert_eq!(
            step.security_context.as_ref().and_then(|sc| sc.run_as_user),
            Some(0)
        );

        let resources = task.spec.resources.as_ref().unwrap();
        assert_eq!(resources.inputs[0].name, "gitsource");
        assert_eq!(resources.outputs[0].name, "builtImage");

        assert_eq!(task.spec.sidecars[0].name, "registry");
        assert_eq!(task.spec.sidecars[0].image.as_deref(), Some("registry:2"));
    }

    #[test]
    fn run_manifest_binds_resources_with_five_minute_timeout() {
        let run = build_task_run("run-x", "task-x", "git-x", "image-x").unwrap();

        assert_eq!(run.spec.task_ref.name, "task-x");
        assert_eq!(run.spec.timeout.as_deref(), Some("5m"));
        let resources = run.spec.resources.as_ref().unwrap();
        assert_eq!(resources.inputs[0].resource_ref.name, "git-x");
        assert_eq!(resources.outputs[0].resource_ref.name, "image-x");
    }

    #[test]
    fn wait_budget_follows_the_manifest_timeout() {
        let mut run = build_task_run("run-x", "task-x", "git-x", "image-x").unwrap();
        assert_eq!(wait_budget(&run), Duration::from_secs(300));

        run.spec.timeout = Some("90s".to_string());
        assert_eq!(wait_budget(&run), Duration::from_secs(90));

        // no timeout, or one the parser rejects: fall back to the default
        run.spec.timeout = None;
        assert_eq!(wait_budget(&run), RUN_BUDGET);
        run.spec.timeout = Some("soon".to_string());
        assert_eq!(wait_budget(&run), RUN_BUDGET);
    }

    #[test]
    fn git_resource_pins_url_and_revision() {
        let git = git_resource("kaniko-git-x").unwrap();
        assert_eq!(git.param("Url"), Some(KANIKO_GIT_URL));
        assert_eq!(git.param("Revision"), Some(KANIKO_GIT_REVISION));
    }
}
