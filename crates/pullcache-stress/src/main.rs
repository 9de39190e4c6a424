use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use pullcache_service::config::Config as ServiceConfig;

mod logging;
mod stresstest;
mod workloads;

use stresstest::perform_stresstest;
use workloads::WorkloadsConfig;

/// Command line interface parser.
#[derive(Parser)]
#[command(about = "Drives pull caches with synthetic concurrent workloads")]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: PathBuf,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Enable the tracing machinery, writing into the void.
    #[arg(long)]
    tracing: bool,

    /// Report metrics to a local statsd sink.
    #[arg(long)]
    metrics: bool,
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // parse configs
    let workloads_file =
        std::fs::File::open(&cli.workloads).context("failed to open workloads file")?;
    let workloads: WorkloadsConfig =
        serde_yaml::from_reader(workloads_file).context("failed to parse workloads YAML")?;

    let service_config = ServiceConfig::get(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    if !cli.tracing {
        pullcache_service::logging::init_logging(&service_config);
    }

    let metrics_config = &service_config.metrics;
    if let Some(statsd) = &metrics_config.statsd {
        pullcache_service::metrics::configure_statsd(
            &metrics_config.prefix,
            statsd.as_str(),
            metrics_config.custom_tags.clone(),
        )?;
    }

    let logging = logging::Config {
        tracing: cli.tracing,
        metrics: cli.metrics,
    };
    let _guard = runtime.block_on(async {
        let mut guard = logging::init(logging)?;
        if let Some(udp_sink) = guard.udp_sink.take() {
            tokio::spawn(udp_sink);
        }
        anyhow::Ok(guard)
    })?;

    runtime.block_on(perform_stresstest(service_config, workloads, cli.duration))
}

fn main() {
    if let Err(error) = run() {
        pullcache_service::logging::ensure_log_error(&error);
        std::process::exit(1);
    }
}
