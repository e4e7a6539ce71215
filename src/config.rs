//! Configuration for end-to-end runs.
//!
//! All knobs a scenario needs are collected in [`HarnessConfig`] and passed
//! in explicitly; nothing in the library reads ambient state at run time.
//! The configuration loads from environment variables with sensible
//! defaults, so CI systems can override test images without code changes.
//!
//! # Environment Variables
//!
//! - `CONVEYOR_E2E`: set to `1` or `true` to enable the live e2e tests
//! - `CONVEYOR_E2E_SKIP_ROOT_USER_TESTS`: skip scenarios whose build steps
//!   must run as root (the kaniko step does) - default: "false"
//! - `CONVEYOR_E2E_NAMESPACE_PREFIX`: prefix for generated test namespaces -
//!   default: "conveyor-e2e"
//! - `CONVEYOR_E2E_KANIKO_IMAGE`: kaniko executor image - default:
//!   "gcr.io/kaniko-project/executor:v1.23.2"
//! - `CONVEYOR_E2E_REGISTRY_IMAGE`: ephemeral registry image - default:
//!   "registry:2"
//! - `CONVEYOR_E2E_SKOPEO_IMAGE`: image-inspection tool image - default:
//!   "quay.io/skopeo/stable:latest"
//! - `CONVEYOR_E2E_LOG_LEVEL`: logging level - default: "info"
//!
//! # Example
//!
//! ```
//! use conveyor_harness::HarnessConfig;
//!
//! let config = HarnessConfig::default();
//! config.validate().expect("invalid configuration");
//! ```

use std::env;
use std::fmt;
use thiserror::Error;

const DEFAULT_NAMESPACE_PREFIX: &str = "conveyor-e2e";
const DEFAULT_KANIKO_IMAGE: &str = "gcr.io/kaniko-project/executor:v1.23.2";
const DEFAULT_REGISTRY_IMAGE: &str = "registry:2";
const DEFAULT_SKOPEO_IMAGE: &str = "quay.io/skopeo/stable:latest";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Upper bound on the namespace prefix so generated names stay inside the
/// 63-character label limit with room for the random suffix.
const MAX_PREFIX_LEN: usize = 40;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The namespace prefix would produce invalid or colliding names.
    #[error("invalid namespace prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    /// A test image reference is empty.
    #[error("{field} must not be empty")]
    EmptyImage { field: &'static str },

    /// Configuration validation failed
    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Returns whether live end-to-end runs are enabled for this process.
///
/// The e2e scenario talks to a real cluster and is skipped unless
/// `CONVEYOR_E2E` is set to `1` or `true`.
pub fn e2e_enabled() -> bool {
    matches!(
        env::var("CONVEYOR_E2E").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("True")
    )
}

/// Global configuration for a harness run.
///
/// Construct with `Default::default()`, which loads from environment
/// variables and falls back to defaults for anything unset.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Skip scenarios that require build steps running as root.
    pub skip_root_user_tests: bool,

    /// Prefix for generated test namespaces.
    pub namespace_prefix: String,

    /// Image for the kaniko build step.
    pub kaniko_image: String,

    /// Image for the ephemeral in-namespace registry (deployment and task
    /// sidecar both use it).
    pub registry_image: String,

    /// Image for the remote-digest inspection pod.
    pub skopeo_image: String,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for HarnessConfig {
    /// Loads configuration from `CONVEYOR_E2E_*` environment variables with
    /// defaults for anything unset.
    fn default() -> Self {
        let skip_root_user_tests = env::var("CONVEYOR_E2E_SKIP_ROOT_USER_TESTS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let namespace_prefix = env::var("CONVEYOR_E2E_NAMESPACE_PREFIX")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE_PREFIX.to_string());

        let kaniko_image = env::var("CONVEYOR_E2E_KANIKO_IMAGE")
            .unwrap_or_else(|_| DEFAULT_KANIKO_IMAGE.to_string());

        let registry_image = env::var("CONVEYOR_E2E_REGISTRY_IMAGE")
            .unwrap_or_else(|_| DEFAULT_REGISTRY_IMAGE.to_string());

        let skopeo_image = env::var("CONVEYOR_E2E_SKOPEO_IMAGE")
            .unwrap_or_else(|_| DEFAULT_SKOPEO_IMAGE.to_string());

        let log_level = env::var("CONVEYOR_E2E_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            skip_root_user_tests,
            namespace_prefix,
            kaniko_image,
            registry_image,
            skopeo_image,
            log_level,
        }
    }
}

impl HarnessConfig {
    /// Validates the configuration.
    ///
    /// Checks that the namespace prefix will produce valid cluster names,
    /// that no image reference is empty, and that the log level is known.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.namespace_prefix;
        if prefix.is_empty() {
            return Err(ConfigError::InvalidPrefix {
                prefix: prefix.clone(),
                reason: "prefix must not be empty".to_string(),
            });
        }
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(ConfigError::InvalidPrefix {
                prefix: prefix.clone(),
                reason: format!("prefix longer than {} characters", MAX_PREFIX_LEN),
            });
        }
        let valid_chars = prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars || prefix.starts_with('-') || prefix.ends_with('-') {
            return Err(ConfigError::InvalidPrefix {
                prefix: prefix.clone(),
                reason: "prefix must be lowercase alphanumerics and '-', \
                         starting and ending with an alphanumeric"
                    .to_string(),
            });
        }

        if self.kaniko_image.is_empty() {
            return Err(ConfigError::EmptyImage {
                field: "kaniko_image",
            });
        }
        if self.registry_image.is_empty() {
            return Err(ConfigError::EmptyImage {
                field: "registry_image",
            });
        }
        if self.skopeo_image.is_empty() {
            return Err(ConfigError::EmptyImage {
                field: "skopeo_image",
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationFailed(format!(
                    "invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(())
    }
}

impl fmt::Display for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Harness Configuration:")?;
        writeln!(f, "  Skip Root User Tests: {}", self.skip_root_user_tests)?;
        writeln!(f, "  Namespace Prefix: {}", self.namespace_prefix)?;
        writeln!(f, "  Kaniko Image: {}", self.kaniko_image)?;
        writeln!(f, "  Registry Image: {}", self.registry_image)?;
        writeln!(f, "  Skopeo Image: {}", self.skopeo_image)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
