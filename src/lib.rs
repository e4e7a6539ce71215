//! conveyor-harness - end-to-end verification for the Conveyor orchestrator
//!
//! This library drives a real cluster running Conveyor through a complete
//! build workflow and verifies what the orchestrator recorded against
//! independent observations. The flagship scenario builds a pinned git
//! revision with kaniko, pushes the image to a registry that exists only
//! inside the test namespace, and cross-checks the reported image digest
//! with the registry itself.
//!
//! # Core Concepts
//!
//! - **Scenario**: one complete provision → submit → wait → extract →
//!   verify → compare flow, reporting soft check failures instead of
//!   stopping at the first deviation
//! - **Cluster Client**: the [`client::ClusterClient`] trait isolating
//!   scenarios from the live API, with a scripted mock for unit tests
//! - **Remote Inspector**: the [`verify::RemoteImageInspector`] trait
//!   answering "what digest does the registry itself report?"
//! - **Harness**: per-run namespace lifecycle with labelled ownership,
//!   interrupt-safe teardown, and sweeping of leaked namespaces
//!
//! # Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use conveyor_harness::client::{ClusterClient, KubeCluster};
//! use conveyor_harness::harness::{NamespaceOption, TestHarness};
//! use conveyor_harness::scenario::KanikoBuildScenario;
//! use conveyor_harness::verify::SkopeoPodInspector;
//! use conveyor_harness::HarnessConfig;
//!
//! async fn run() -> anyhow::Result<bool> {
//!     let config = HarnessConfig::default();
//!     let client: Arc<dyn ClusterClient> = Arc::new(KubeCluster::connect().await?);
//!
//!     let harness = TestHarness::setup(
//!         Arc::clone(&client),
//!         &config,
//!         &[NamespaceOption::WithRegistry],
//!     )
//!     .await?;
//!
//!     let inspector = SkopeoPodInspector::new(Arc::clone(&client), &config.skopeo_image);
//!     let scenario = KanikoBuildScenario::new(Arc::clone(&client), config);
//!     let outcome = scenario.run(&inspector, &harness.namespace).await;
//!
//!     harness.teardown().await?;
//!     Ok(outcome?.passed())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`scenario`]: end-to-end scenario drivers and their reports
//! - [`resources`]: typed models of Conveyor's resource kinds
//! - [`client`]: cluster access (live and mock)
//! - [`verify`]: digest handling and remote image inspection
//! - [`harness`]: namespace setup, teardown, and sweeping
//! - [`registry`]: the in-namespace ephemeral registry
//! - [`wait`]: deadline-bounded polling
//! - [`names`]: collision-resistant object names

// Public modules
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod harness;
pub mod names;
pub mod registry;
pub mod resources;
pub mod scenario;
pub mod util;
pub mod verify;
pub mod wait;

// Re-export key types for convenient access
pub use client::{ClusterClient, KubeCluster, MockCluster};
pub use config::{e2e_enabled, ConfigError, HarnessConfig};
pub use error::HarnessError;
pub use harness::{sweep_namespaces, NamespaceOption, TestHarness};
pub use scenario::{CheckFailure, KanikoBuildScenario, RemoteVerification, ScenarioReport};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use verify::{Digest, FixedInspector, RemoteImageInspector, SkopeoPodInspector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
