//! Test environment lifecycle.
//!
//! Every scenario runs inside its own namespace, created fresh at setup
//! and deleted at teardown no matter how the scenario ends. Namespaces are
//! labelled so an aborted run's leftovers can be swept later.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::client::ClusterClient;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::names::object_name;
use crate::registry::install_registry;

/// Label key marking namespaces owned by the harness.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label value marking namespaces owned by the harness.
pub const MANAGED_BY_VALUE: &str = "conveyor-harness";

/// Extras to provision alongside a test namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceOption {
    /// Install the ephemeral registry deployment and service.
    WithRegistry,
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// An isolated, labelled namespace for one scenario run.
pub struct TestHarness {
    client: Arc<dyn ClusterClient>,
    /// The namespace all scenario objects go into.
    pub namespace: String,
}

impl TestHarness {
    /// Creates a uniquely-named namespace and provisions the requested
    /// options into it.
    ///
    /// # Errors
    ///
    /// Returns the underlying API error if the namespace or any option
    /// cannot be created. Nothing is rolled back on failure; callers
    /// should still tear down.
    pub async fn setup(
        client: Arc<dyn ClusterClient>,
        config: &HarnessConfig,
        options: &[NamespaceOption],
    ) -> Result<Self, HarnessError> {
        let namespace = object_name(&config.namespace_prefix);
        client.create_namespace(&namespace, &managed_labels()).await?;

        for option in options {
            match option {
                NamespaceOption::WithRegistry => {
                    install_registry(client.as_ref(), &namespace, &config.registry_image).await?;
                }
            }
        }

        info!(namespace = %namespace, "test environment ready");
        Ok(Self { client, namespace })
    }

    /// The client this harness was built with.
    pub fn client(&self) -> Arc<dyn ClusterClient> {
        Arc::clone(&self.client)
    }

    /// Deletes the namespace and everything in it.
    ///
    /// Safe to call after a partial setup or a second time; a namespace
    /// that is already gone is not an error.
    pub async fn teardown(&self) -> Result<(), HarnessError> {
        info!(namespace = %self.namespace, "tearing down");
        self.client.delete_namespace(&self.namespace).await
    }

    /// Arranges for the namespace to be deleted if the process is
    /// interrupted mid-run, then exits with the conventional SIGINT code.
    pub fn cleanup_on_interrupt(&self) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let namespace = self.namespace.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(namespace = %namespace, "interrupted; tearing down");
                if let Err(e) = client.delete_namespace(&namespace).await {
                    error!(namespace = %namespace, error = %e, "teardown on interrupt failed");
                }
                std::process::exit(130);
            }
        })
    }
}

/// Deletes every namespace the harness has left behind.
///
/// Returns the names that were deleted.
///
/// # Errors
///
/// Returns the first API error; namespaces later in the list are left
/// for the next sweep.
pub async fn sweep_namespaces(client: &dyn ClusterClient) -> Result<Vec<String>, HarnessError> {
    let selector = format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}");
    let names = client.list_namespaces(&selector).await?;
    for name in &names {
        client.delete_namespace(name).await?;
        info!(namespace = %name, "swept");
    }
    Ok(names)
}
