//! Remote image verification.
//!
//! After a build pushes into the in-namespace registry, the harness checks
//! that the registry really holds the image by asking for its digest from
//! inside the cluster. The digest comes back through pod logs, which drag
//! in shell quoting and trailing newlines, so everything funnels through
//! [`extract_digest`] before comparison.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;
use tracing::{debug, warn};

use crate::client::ClusterClient;
use crate::error::HarnessError;
use crate::names::object_name;
use crate::wait::wait_until;

/// Container name inside the inspection pod.
const SKOPEO_CONTAINER: &str = "skopeo";

/// How long to wait for an inspection pod to finish.
const DEFAULT_INSPECT_BUDGET: Duration = Duration::from_secs(120);

const INSPECT_INTERVAL: Duration = Duration::from_secs(1);

fn digest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"sha256:[0-9a-fA-F]{64}|sha512:[0-9a-fA-F]{128}").expect("valid regex")
    })
}

/// A validated, normalized image digest such as
/// `sha256:3fc4…` (always lowercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// Parses a digest, tolerating surrounding whitespace and quotes.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::DigestNotFound`] if the input is not a
    /// `sha256:` or `sha512:` digest.
    pub fn parse(raw: &str) -> Result<Self, HarnessError> {
        let candidate = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        let normalized = candidate.to_ascii_lowercase();
        let valid = digest_pattern()
            .find(&normalized)
            .map(|m| m.start() == 0 && m.end() == normalized.len())
            .unwrap_or(false);
        if !valid {
            return Err(HarnessError::DigestNotFound {
                output: truncate(raw),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pulls the first digest out of tool output.
///
/// Inspection output arrives via pod logs and may carry quotes, progress
/// lines, or trailing newlines around the digest itself.
///
/// # Errors
///
/// Returns [`HarnessError::DigestNotFound`] if no digest appears anywhere
/// in the output.
pub fn extract_digest(output: &str) -> Result<Digest, HarnessError> {
    match digest_pattern().find(output) {
        Some(m) => Digest::parse(m.as_str()),
        None => Err(HarnessError::DigestNotFound {
            output: truncate(output),
        }),
    }
}

fn truncate(output: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = output.trim();
    if trimmed.len() <= LIMIT {
        return trimmed.to_string();
    }
    let mut end = LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// Looks up the digest an image registry reports for an image.
#[async_trait]
pub trait RemoteImageInspector: Send + Sync {
    /// Returns the digest of `image:latest` as seen by the registry,
    /// running the inspection from inside `namespace`.
    async fn image_digest(&self, namespace: &str, image: &str)
        -> Result<Digest, HarnessError>;
}

/// Inspects images by running a one-shot skopeo pod inside the cluster.
///
/// The in-namespace registry is only reachable on the cluster network, so
/// the lookup has to run there too. The pod prints the digest to stdout
/// and exits; its logs are the result.
pub struct SkopeoPodInspector {
    client: Arc<dyn ClusterClient>,
    skopeo_image: String,
    budget: Duration,
}

impl SkopeoPodInspector {
    pub fn new(client: Arc<dyn ClusterClient>, skopeo_image: impl Into<String>) -> Self {
        Self {
            client,
            skopeo_image: skopeo_image.into(),
            budget: DEFAULT_INSPECT_BUDGET,
        }
    }

    /// Overrides the completion budget for the inspection pod.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }
}

fn inspection_pod(name: &str, skopeo_image: &str, image: &str) -> Pod {
    let script = format!(
        "skopeo inspect --tls-verify=false --format '{{{{.Digest}}}}' docker://{image}:latest"
    );
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: SKOPEO_CONTAINER.to_string(),
                image: Some(skopeo_image.to_string()),
                command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                args: Some(vec![script]),
                ..Default::default()
            }],
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl RemoteImageInspector for SkopeoPodInspector {
    async fn image_digest(
        &self,
        namespace: &str,
        image: &str,
    ) -> Result<Digest, HarnessError> {
        let name = object_name("skopeo-inspect");
        let pod = inspection_pod(&name, &self.skopeo_image, image);
        self.client.create_pod(namespace, &pod).await?;
        debug!(namespace, pod = %name, image, "inspection pod created");

        let phase = wait_until(
            "PodTerminated",
            self.budget,
            INSPECT_INTERVAL,
            || {
                let client = Arc::clone(&self.client);
                let namespace = namespace.to_string();
                let name = name.clone();
                async move {
                    let pod = client.get_pod(&namespace, &name).await?;
                    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                    Ok(match phase {
                        Some(p @ ("Succeeded" | "Failed")) => Some(p.to_string()),
                        _ => None,
                    })
                }
            },
        )
        .await?;

        if phase == "Failed" {
            warn!(namespace, pod = %name, "inspection pod failed; reading logs anyway");
        }

        let logs = self
            .client
            .pod_logs(namespace, &name, SKOPEO_CONTAINER)
            .await?;
        extract_digest(&logs)
    }
}

/// Inspector with a canned answer, for tests.
pub struct FixedInspector {
    digest: Option<Digest>,
    error: Option<String>,
}

impl FixedInspector {
    /// Always reports the given digest.
    pub fn returning(digest: Digest) -> Self {
        Self {
            digest: Some(digest),
            error: None,
        }
    }

    /// Always fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            digest: None,
            error: Some(message.into()),
        }
    }
}

#[async_trait]
impl RemoteImageInspector for FixedInspector {
    async fn image_digest(
        &self,
        _namespace: &str,
        _image: &str,
    ) -> Result<Digest, HarnessError> {
        if let Some(message) = &self.error {
            return Err(HarnessError::other(message.clone()));
        }
        match &self.digest {
            Some(digest) => Ok(digest.clone()),
            None => Err(HarnessError::other("no digest configured")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCluster;
    use yare::parameterized;

    const SHA256: &str = "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";

    #[parameterized(
        bare = { "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4" },
        quoted = { "\"sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4\"" },
        padded = { "  sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4\n" },
        uppercase_hex = { "sha256:A3ED95CAEB02FFE68CDD9FD84406680AE93D633CB16422D00E8A7C22955B46D4" },
    )]
    fn parse_accepts(input: &str) {
        assert_eq!(Digest::parse(input).unwrap().as_str(), SHA256);
    }

    #[parameterized(
        empty = { "" },
        wrong_algo = { "md5:d41d8cd98f00b204e9800998ecf8427e" },
        short_hex = { "sha256:abc123" },
        trailing_junk = { "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4 extra" },
    )]
    fn parse_rejects(input: &str) {
        assert!(Digest::parse(input).is_err());
    }

    #[test]
    fn parse_accepts_sha512() {
        let hex = "ab".repeat(64);
        let digest = Digest::parse(&format!("sha512:{hex}")).unwrap();
        assert!(digest.as_str().starts_with("sha512:"));
    }

    #[test]
    fn extract_finds_digest_in_noisy_logs() {
        let logs = format!(
            "time=\"2024-01-01\" level=info msg=\"fetching manifest\"\n\"{SHA256}\"\n"
        );
        assert_eq!(extract_digest(&logs).unwrap().as_str(), SHA256);
    }

    #[test]
    fn extract_fails_on_digestless_output() {
        let err = extract_digest("FATA[0000] pinging container registry: connection refused")
            .unwrap_err();
        match err {
            HarnessError::DigestNotFound { output } => {
                assert!(output.contains("connection refused"));
            }
            other => panic!("expected DigestNotFound, got {other:?}"),
        }
    }

    #[test]
    fn extract_truncates_long_output_in_error() {
        let noise = "x".repeat(1000);
        let err = extract_digest(&noise).unwrap_err();
        match err {
            HarnessError::DigestNotFound { output } => {
                assert!(output.len() <= 210);
                assert!(output.ends_with("..."));
            }
            other => panic!("expected DigestNotFound, got {other:?}"),
        }
    }

    #[test]
    fn inspection_pod_runs_skopeo_against_latest_tag() {
        let pod = inspection_pod("probe-1", "quay.io/skopeo/stable:latest", "registry.ns:5000/app");
        let spec = pod.spec.as_ref().unwrap();

        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        let container = &spec.containers[0];
        assert_eq!(container.name, SKOPEO_CONTAINER);

        let script = &container.args.as_ref().unwrap()[0];
        assert!(script.contains("--tls-verify=false"));
        assert!(script.contains("docker://registry.ns:5000/app:latest"));
        assert!(script.contains("{{.Digest}}"));
    }

    #[tokio::test(start_paused = true)]
    async fn skopeo_inspector_reads_digest_from_pod_logs() {
        let mock = Arc::new(MockCluster::new());
        mock.push_pod_phase("Pending");
        mock.push_pod_phase("Running");
        mock.push_pod_phase("Succeeded");
        mock.set_container_logs(SKOPEO_CONTAINER, &format!("\"{SHA256}\"\n"));

        let inspector = SkopeoPodInspector::new(
            Arc::clone(&mock) as Arc<dyn ClusterClient>,
            "quay.io/skopeo/stable:latest",
        );
        let digest = inspector
            .image_digest("ns", "registry.ns:5000/app")
            .await
            .unwrap();

        assert_eq!(digest.as_str(), SHA256);

        let created = mock.created_objects();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, "Pod");
        assert!(created[0].name.starts_with("skopeo-inspect-"));
    }

    #[tokio::test]
    async fn skopeo_inspector_reports_failed_pod_output() {
        let mock = Arc::new(MockCluster::new());
        mock.push_pod_phase("Failed");
        mock.set_container_logs(SKOPEO_CONTAINER, "unable to reach registry");

        let inspector = SkopeoPodInspector::new(
            Arc::clone(&mock) as Arc<dyn ClusterClient>,
            "quay.io/skopeo/stable:latest",
        );
        let err = inspector
            .image_digest("ns", "registry.ns:5000/app")
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::DigestNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn skopeo_inspector_times_out_on_stuck_pod() {
        let mock = Arc::new(MockCluster::new());
        mock.push_pod_phase("Running");

        let inspector = SkopeoPodInspector::new(
            Arc::clone(&mock) as Arc<dyn ClusterClient>,
            "quay.io/skopeo/stable:latest",
        )
        .with_budget(Duration::from_secs(3));

        let err = inspector
            .image_digest("ns", "registry.ns:5000/app")
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn fixed_inspector_returns_canned_digest() {
        let digest = Digest::parse(SHA256).unwrap();
        let inspector = FixedInspector::returning(digest.clone());
        assert_eq!(
            inspector.image_digest("ns", "whatever").await.unwrap(),
            digest
        );

        let failing = FixedInspector::failing("registry offline");
        assert!(failing.image_digest("ns", "whatever").await.is_err());
    }
}
