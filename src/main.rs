//! vcqueue controller - keeps Volcano Queue status in step with its PodGroups

use std::time::Duration;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use vcqueue_common::crd::{PodGroup, Queue};
use vcqueue_common::telemetry::{init_telemetry, TelemetryConfig, DEFAULT_LOG_FILTER};
use vcqueue_controller::{run, ControllerConfig};

/// Queue controller for Volcano-style batch scheduling
#[derive(Parser, Debug)]
#[command(name = "vcqueue-controller", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Number of workers reconciling queue requests
    #[arg(long, env = "VCQUEUE_QUEUE_WORKERS", default_value_t = 1)]
    queue_workers: usize,

    /// Number of workers consuming commands
    #[arg(long, env = "VCQUEUE_COMMAND_WORKERS", default_value_t = 1)]
    command_workers: usize,

    /// Retries before a failing request is dropped
    #[arg(long, env = "VCQUEUE_MAX_RETRIES", default_value_t = vcqueue_controller::config::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Initial per-item retry delay in milliseconds
    #[arg(long, env = "VCQUEUE_BASE_DELAY_MS", default_value_t = 5)]
    base_delay_ms: u64,

    /// Upper bound on the per-item retry delay in seconds
    #[arg(long, env = "VCQUEUE_MAX_DELAY_SECS", default_value_t = 1000)]
    max_delay_secs: u64,

    /// How often a closing queue is re-checked for remaining PodGroups
    #[arg(
        long,
        env = "VCQUEUE_DRAIN_RECHECK_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    drain_recheck_secs: u64,

    /// Emit JSON log lines
    #[arg(long, env = "VCQUEUE_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            queue_workers: self.queue_workers,
            command_workers: self.command_workers,
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            drain_recheck_interval: Duration::from_secs(self.drain_recheck_secs),
            ..ControllerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [Queue::crd(), PodGroup::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        json: cli.log_json,
        default_filter: DEFAULT_LOG_FILTER.to_string(),
    })?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("received shutdown signal");
        signal.cancel();
    });

    run(client, cli.controller_config(), shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_controller_defaults() {
        let cli = Cli::parse_from(["vcqueue-controller"]);
        let config = cli.controller_config();
        let defaults = ControllerConfig::default();

        assert_eq!(config.queue_workers, defaults.queue_workers);
        assert_eq!(config.command_workers, defaults.command_workers);
        assert_eq!(config.max_retries, defaults.max_retries);
        assert_eq!(config.base_delay, defaults.base_delay);
        assert_eq!(config.max_delay, defaults.max_delay);
        assert_eq!(config.drain_recheck_interval, defaults.drain_recheck_interval);
        assert!(!cli.crd);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "vcqueue-controller",
            "--queue-workers",
            "4",
            "--drain-recheck-secs",
            "2",
        ]);
        let config = cli.controller_config();
        assert_eq!(config.queue_workers, 4);
        assert_eq!(config.drain_recheck_interval, Duration::from_secs(2));
    }

    #[test]
    fn zero_drain_recheck_is_rejected() {
        let err = Cli::try_parse_from(["vcqueue-controller", "--drain-recheck-secs", "0"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(Cli::try_parse_from(["vcqueue-controller", "--drain-recheck-secs", "1"]).is_ok());
    }
}
