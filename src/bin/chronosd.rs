//! chronosd - time-bounded GPU partition manager daemon
//!
//! Owns the one long-lived `PartitionManager` for the host: the device
//! registry, the partition table, and the background expiration monitor.
//! `chronosctl` invocations are short-lived IPC clients against this
//! process, so a partition created by one invocation survives to be listed,
//! released, or expired by a later one.

use anyhow::Result;
use chronos_core::config::ChronosConfig;
use chronos_core::gpu::OpenClSource;
use chronos_core::ipc::{IpcHandler, IpcRequest, IpcResponse, IpcServer};
use chronos_core::ipc_types::{DeviceStatsWire, PartitionWire};
use chronos_core::platform::SystemPlatform;
use chronos_core::{ChronosError, Clock, PartitionManager, SystemClock};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "chronosd", version, about = "Time-bounded GPU partition manager daemon")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/chronos/chronos.toml")]
    config: PathBuf,

    /// Run in the foreground (the only mode this implementation supports)
    #[arg(short, long)]
    foreground: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

struct Handler {
    manager: PartitionManager,
}

fn map_err(err: ChronosError) -> IpcResponse {
    IpcResponse::error(err.to_string())
}

impl IpcHandler for Handler {
    async fn handle(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Create {
                device_idx,
                memory_fraction,
                duration_secs,
                caller,
            } => match self
                .manager
                .create(device_idx, memory_fraction, duration_secs, &caller)
            {
                Ok(id) => IpcResponse::success(id),
                Err(e) => map_err(e),
            },
            IpcRequest::List { verbose } => {
                let snapshots = self.manager.list(verbose);
                let wire: Vec<PartitionWire> = snapshots.iter().map(PartitionWire::from).collect();
                IpcResponse::success(wire)
            }
            IpcRequest::Release {
                partition_id,
                caller,
            } => match self.manager.release(&partition_id, &caller) {
                Ok(()) => IpcResponse::success(()),
                Err(e) => map_err(e),
            },
            IpcRequest::DeviceStats => {
                let stats = self.manager.device_stats();
                let wire: Vec<DeviceStatsWire> = stats.iter().map(DeviceStatsWire::from).collect();
                IpcResponse::success(wire)
            }
            IpcRequest::AvailableFraction { device_idx } => {
                match self.manager.available_fraction(device_idx) {
                    Ok(pct) => IpcResponse::success(pct),
                    Err(e) => map_err(e),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ChronosConfig::load(&args.config).unwrap_or_else(|e| {
        eprintln!("failed to load config {:?}: {e}, using defaults", args.config);
        ChronosConfig::default()
    });

    let log_level = if args.debug { "debug" } else { config.daemon.log_level.as_str() };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    info!("chronosd v{VERSION} starting");
    if !args.foreground {
        info!("this build only runs in the foreground; ignoring absence of --foreground");
    }

    let gpu_source = OpenClSource::new();
    let platform = Arc::new(SystemPlatform::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let lock_dir = PathBuf::from(&config.daemon.lock_dir);

    let monitor_period = std::time::Duration::from_secs(config.daemon.monitor_period_secs);
    let manager =
        PartitionManager::with_monitor_period(&gpu_source, platform, clock, lock_dir, monitor_period);
    let handler = Handler { manager };

    let server = IpcServer::new(config.daemon.socket_path.clone(), handler);
    if let Err(e) = server.run().await {
        error!("IPC server exited: {e}");
        return Err(e);
    }

    Ok(())
}
