//! Error types for the harness library.
//!
//! The split follows the scenario contract: anything that makes the rest of
//! a run meaningless (resource creation, verifier infrastructure) surfaces
//! as a [`HarnessError`] and aborts; observed deviations that still leave
//! diagnostics worth collecting are *not* errors at all. Those are recorded
//! as [`crate::scenario::CheckFailure`] values in the scenario report.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Fatal errors raised by harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A cluster API request failed (transport, auth, or server-side).
    #[error("cluster api request failed: {0}")]
    Api(#[from] kube::Error),

    /// A YAML manifest could not be parsed into the expected resource kind.
    #[error("invalid {kind} manifest: {source}")]
    Manifest {
        kind: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// A typed resource could not be converted to or from its wire form.
    #[error("object conversion failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// A wait helper exhausted its budget. `condition` is the human-readable
    /// label passed to [`crate::wait::wait_until`].
    #[error("timed out after {waited:?} waiting for {condition}")]
    WaitTimeout { condition: String, waited: Duration },

    /// Container logs could not be retrieved from a pod.
    #[error("no {container} logs available from pod {pod}: {detail}")]
    LogsUnavailable {
        pod: String,
        container: String,
        detail: String,
    },

    /// The inspection pod produced output with no digest token in it.
    #[error("no digest found in inspection output: {output:?}")]
    DigestNotFound { output: String },

    /// A named object does not exist in the given namespace.
    #[error("{object} not found in namespace {namespace}")]
    NotFound { object: String, namespace: String },

    /// Configuration was invalid or incomplete.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Catch-all for cases with no structured variant (mock scripting,
    /// unexpected cluster responses).
    #[error("{0}")]
    Other(String),
}

impl HarnessError {
    /// Shorthand for the catch-all variant.
    pub fn other(message: impl Into<String>) -> Self {
        HarnessError::Other(message.into())
    }
}
