use conveyor_harness::cli::commands::{CliArgs, Commands, RunArgs};
use conveyor_harness::client::{ClusterClient, KubeCluster};
use conveyor_harness::harness::{sweep_namespaces, NamespaceOption, TestHarness};
use conveyor_harness::scenario::KanikoBuildScenario;
use conveyor_harness::util::logging::{init_logging, parse_level, LoggingConfig};
use conveyor_harness::verify::SkopeoPodInspector;
use conveyor_harness::{HarnessConfig, NAME, VERSION};

use anyhow::Context;
use clap::Parser;
use std::env;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Run(run_args) => handle_run(run_args).await,
        Commands::Sweep => handle_sweep().await,
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("CONVEYOR_E2E_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(LoggingConfig::with_level(level));
}

async fn handle_run(args: &RunArgs) -> i32 {
    match run_scenario(args).await {
        Ok(true) => 0,
        Ok(false) => {
            error!("scenario finished with failed checks");
            1
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

async fn run_scenario(args: &RunArgs) -> anyhow::Result<bool> {
    let config = HarnessConfig::default();
    config.validate().context("invalid configuration")?;
    debug!("\n{}", config);

    if config.skip_root_user_tests {
        info!("skipping: the build step runs as root and skip_root_user_tests is set");
        return Ok(true);
    }

    let client: Arc<dyn ClusterClient> = Arc::new(
        KubeCluster::connect()
            .await
            .context("connecting to cluster")?,
    );

    let harness = TestHarness::setup(
        Arc::clone(&client),
        &config,
        &[NamespaceOption::WithRegistry],
    )
    .await
    .context("setting up test namespace")?;
    let interrupt = harness.cleanup_on_interrupt();

    let inspector = SkopeoPodInspector::new(Arc::clone(&client), config.skopeo_image.clone());
    let scenario = KanikoBuildScenario::new(Arc::clone(&client), config);
    let outcome = scenario.run(&inspector, &harness.namespace).await;

    interrupt.abort();
    if args.keep_namespace {
        info!(namespace = %harness.namespace, "keeping namespace for inspection");
    } else if let Err(e) = harness.teardown().await {
        error!(namespace = %harness.namespace, error = %e, "teardown failed");
    }

    let report = outcome.context("scenario aborted")?;
    println!("{report}");
    Ok(report.passed())
}

async fn handle_sweep() -> i32 {
    match sweep().await {
        Ok(swept) if swept.is_empty() => {
            info!("no leftover namespaces found");
            0
        }
        Ok(swept) => {
            info!(count = swept.len(), "swept leftover namespaces");
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

async fn sweep() -> anyhow::Result<Vec<String>> {
    let cluster = KubeCluster::connect()
        .await
        .context("connecting to cluster")?;
    let swept = sweep_namespaces(&cluster)
        .await
        .context("sweeping namespaces")?;
    Ok(swept)
}
