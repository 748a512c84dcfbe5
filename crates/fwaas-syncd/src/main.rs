//! fwaas-syncd entry point.
//!
//! Loads the configuration, wires the coordinator to the simulated topology
//! and either runs the sync loop or, with `--once`, syncs every router once
//! and prints the resulting backend sections.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fwaas_backend::{BackendClient, InMemoryBackend};
use fwaas_syncd::audit::{
    init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord, LogFormat,
};
use fwaas_syncd::audit_log;
use fwaas_syncd::config::{FwaasSyncConfig, DEFAULT_CONFIG_PATH};
use fwaas_syncd::fwaas::{
    EdgeFwaasDriver, FirewallSyncCoordinator, FwaasEligibility, FwaasOrch, FwaasOrchConfig,
    InMemoryDirectory,
};
use fwaas_syncd::{SyncDaemon, SyncDaemonConfig};
use tracing::{error, info, warn};

/// FWaaS router firewall sync daemon
#[derive(Parser, Debug)]
#[command(name = "fwaas-syncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Sync every router once, print the backend sections as JSON and exit
    #[arg(long)]
    once: bool,

    /// Heartbeat interval in milliseconds (overrides the config file)
    #[arg(long)]
    heartbeat_interval: Option<u64>,
}

/// Passes allowed for a `--once` run to drain retries.
const ONCE_MAX_PASSES: usize = 16;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let logging = match args.log_format {
        LogFormat::Json => init_logging(&args.log_level),
        LogFormat::Pretty => init_logging_pretty(&args.log_level),
    };
    if let Err(e) = logging {
        eprintln!("fwaas-syncd: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fwaas-syncd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = FwaasSyncConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(interval) = args.heartbeat_interval {
        config.heartbeat_interval_ms = interval;
        config.validate()?;
    }

    info!("Starting fwaas-syncd");
    info!("FWaaS enabled: {}", config.fwaas_enabled);
    info!("Heartbeat interval: {}ms", config.heartbeat_interval_ms);
    info!("Batch size: {}", config.batch_size);

    audit_log!(AuditRecord::new(
        AuditCategory::ConfigurationChange,
        "fwaas-syncd",
        "config_loaded",
    )
    .with_outcome(AuditOutcome::Success)
    .with_object_id(args.config.display().to_string())
    .with_details(serde_json::json!({
        "fwaas_enabled": config.fwaas_enabled,
        "require_attached_group": config.require_attached_group,
        "heartbeat_interval_ms": config.heartbeat_interval_ms,
        "batch_size": config.batch_size,
    })));

    let (directory, backend, routers) = match &config.topology {
        Some(topology) => {
            let (directory, backend) = topology.build().context("building topology")?;
            (directory, backend, topology.router_ids())
        }
        None => {
            warn!("No topology configured, running with an empty directory");
            (InMemoryDirectory::new(), InMemoryBackend::new(), Vec::new())
        }
    };
    let directory = Arc::new(directory);
    let backend = Arc::new(backend);
    let client = BackendClient::from_shared(Arc::clone(&backend));

    let eligibility = Arc::new(FwaasEligibility::new(
        config.fwaas_enabled,
        config.require_attached_group,
        directory.clone(),
        directory.clone(),
    ));
    let driver = Arc::new(EdgeFwaasDriver::new(directory.clone()));
    let coordinator = Arc::new(FirewallSyncCoordinator::new(
        eligibility,
        directory.clone(),
        directory.clone(),
        directory.clone(),
        driver,
    ));

    let mut orch = FwaasOrch::new(
        FwaasOrchConfig {
            batch_size: config.batch_size,
            ..FwaasOrchConfig::default()
        },
        Arc::clone(&coordinator),
        directory.clone(),
        client,
    );
    info!("Queueing initial sync of {} routers", routers.len());
    orch.enqueue_resync(routers);

    let mut daemon = SyncDaemon::new(SyncDaemonConfig {
        heartbeat_interval_ms: config.heartbeat_interval_ms,
    });
    daemon.register_orch(Box::new(orch));

    if args.once {
        if !daemon.run_until_idle(ONCE_MAX_PASSES).await {
            warn!("Some routers still pending after {} passes", ONCE_MAX_PASSES);
        }
        let stats = coordinator.stats();
        info!(
            "Synced {} routers ({} rules, {} failures)",
            stats.syncs, stats.rules_pushed, stats.failures
        );

        let sections: serde_json::Map<String, serde_json::Value> = backend
            .sections()
            .into_iter()
            .map(|(id, rules)| Ok((id.into_inner(), serde_json::to_value(rules)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&sections)?);
        return Ok(());
    }

    let stop = daemon.stop_handle();
    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                stop.stop();
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c: {}", err);
            }
        }
    });

    daemon.run().await;
    shutdown_handle.abort();

    info!("fwaas-syncd shutdown complete");
    Ok(())
}
