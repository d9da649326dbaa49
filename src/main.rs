//! BCS upgrade tool - migrate legacy project/cluster records to the new platform

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bcs_upgrade_tool::config::UpgradeConfig;
use bcs_upgrade_tool::migrate::Migrator;

/// One-shot migration of legacy project/cluster records into the new platform
///
/// Reads projects and clusters from the legacy relational store, reconciles
/// cluster identities against the target document store, registers projects
/// with the new platform, and deploys a kube agent into every migrated
/// cluster. Safe to re-run: existing records are detected and skipped.
#[derive(Parser, Debug)]
#[command(name = "bcs-upgrade-tool", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'f', long = "config")]
    config_file: std::path::PathBuf,

    /// Reconcile against an in-memory snapshot and report, writing nothing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config before tracing: the debug toggle feeds the default filter.
    let config = UpgradeConfig::load(&cli.config_file)
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    // Store connection failures are fatal: nothing downstream can proceed.
    // Per-item failures inside the run are tallied and do not affect the
    // exit code.
    let migrator = Migrator::connect(config)
        .await
        .map_err(|e| anyhow::anyhow!("store connection failed: {e}"))?;

    migrator
        .run(cli.dry_run)
        .await
        .map_err(|e| anyhow::anyhow!("migration aborted: {e}"))?;

    Ok(())
}
