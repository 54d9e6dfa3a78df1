//! `rkvc`: report the CSI volume condition of volumes attached to a node.

mod catalog;
mod config;
mod probe;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::{KubeStore, VolumeCatalog};
use crate::config::{Cli, LogFormat, OutputFormat, ProbeConfig};
use crate::probe::{GrpcConnector, ProbeSummary, Prober};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = ProbeConfig::from(&cli);
    run(&config).await
}

/// Logs go to stderr so that stdout only carries the report.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: &ProbeConfig) -> Result<()> {
    let store = KubeStore::try_default()
        .await
        .context("could not create a Kubernetes client")?;

    let mut catalog = VolumeCatalog::new(store).with_policy(config.policy);
    if let Some(node) = &config.node_filter {
        catalog = catalog.with_node_filter(node.clone());
    }
    let volumes = catalog
        .list_volumes()
        .await
        .context("failed to get VolumeAttachments")?;
    info!(count = volumes.len(), "volumes to check");

    let platform = libcsi::platform::build(config.platform_kind, config.platform.clone());
    let mut prober = Prober::new(GrpcConnector::new(platform, config.connect.clone()));
    let summary = prober.probe_all(&volumes).await;

    info!(
        healthy = summary.count(libcsi::Health::Healthy),
        unhealthy = summary.count(libcsi::Health::Unhealthy),
        unknown = summary.count(libcsi::Health::Unknown),
        skipped = summary.skipped,
        "probe finished"
    );

    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), &summary, config.output).context("failed to write report")
}

/// One line per probed volume, or the whole summary as JSON.
fn write_report(out: &mut impl Write, summary: &ProbeSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for report in &summary.reports {
                writeln!(
                    out,
                    "{} {} {} {}",
                    report.volume.volume_id,
                    report.volume.driver_name,
                    report.volume.node,
                    report.health
                )?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, summary)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
