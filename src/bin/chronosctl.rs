//! chronosctl - Chronos control utility
//!
//! Implements the public operations (`create`, `list`, `release`, `stats`,
//! `available`) plus clap's automatic `help` subcommand, against the
//! `chronosd` daemon over its IPC socket. Exit code is 0 on success, 1 on
//! any argument validation failure, operation failure, or unknown command.

use chronos_core::format;
use chronos_core::ipc::IpcClient;
use chronos_core::platform::{Platform, SystemPlatform};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chronos", version, about = "Control the Chronos GPU partition daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon IPC socket path
    #[arg(long, default_value = "/run/chronos/chronosd.sock")]
    socket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Admit a new time-bounded partition
    Create {
        device_idx: usize,
        memory_fraction: f32,
        duration: u64,
    },
    /// List active partitions
    List,
    /// Release a partition by id
    Release { partition_id: String },
    /// Show per-device usage statistics
    Stats,
    /// Show available memory fraction for a device, as a percentage
    Available { device_idx: usize },
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap's own `.exit()` uses code 2 for parse errors; the spec's
            // exit-code contract (§6) wants 1 for any argument failure or
            // unknown command, same as an operation failure. Help/version
            // display is not a failure, so it keeps clap's usual 0.
            let _ = e.print();
            let is_display = matches!(
                e.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            );
            std::process::exit(if is_display { 0 } else { 1 });
        }
    };
    let client = IpcClient::new(cli.socket);
    let platform = SystemPlatform::new();

    let ok = run(cli.command, &client, &platform).await;
    std::process::exit(if ok { 0 } else { 1 });
}

async fn run(command: Commands, client: &IpcClient, platform: &SystemPlatform) -> bool {
    match command {
        Commands::Create {
            device_idx,
            memory_fraction,
            duration,
        } => {
            let caller = platform.username();
            match client.create(device_idx, memory_fraction, duration, &caller).await {
                Ok(id) => {
                    println!("{id}");
                    true
                }
                Err(e) => {
                    eprintln!("create failed: {e}");
                    false
                }
            }
        }

        Commands::List => match client.list(true).await {
            Ok(wire) => {
                let snapshots: Vec<chronos_core::manager::PartitionSnapshot> = wire
                    .iter()
                    .map(|p| chronos_core::manager::PartitionSnapshot {
                        id: p.id.clone(),
                        device_idx: p.device_idx,
                        device_name: p.device_name.clone(),
                        memory_fraction: p.memory_fraction,
                        duration: std::time::Duration::from_secs(p.duration_secs),
                        remaining: std::time::Duration::from_secs(p.remaining_secs),
                        owner: p.owner.clone(),
                        pid: p.pid,
                    })
                    .collect();
                println!("{}", format::format_listing(&snapshots));
                true
            }
            Err(e) => {
                eprintln!("list failed: {e}");
                false
            }
        },

        Commands::Release { partition_id } => {
            let caller = platform.username();
            match client.release(&partition_id, &caller).await {
                Ok(()) => {
                    println!("released {partition_id}");
                    true
                }
                Err(e) => {
                    eprintln!("release failed: {e}");
                    false
                }
            }
        }

        Commands::Stats => match client.device_stats().await {
            Ok(wire) => {
                let stats: Vec<chronos_core::manager::DeviceStats> = wire
                    .iter()
                    .map(|d| chronos_core::manager::DeviceStats {
                        idx: d.idx,
                        name: d.name.clone(),
                        vendor: d.vendor.clone(),
                        version: d.version.clone(),
                        type_tokens: d
                            .type_tokens
                            .iter()
                            .map(|t| known_type_token(t))
                            .collect(),
                        total_memory: d.total_memory,
                        available_memory: d.available_memory,
                        active_partition_count: d.active_partition_count,
                    })
                    .collect();
                println!("{}", format::format_device_stats(&stats));
                true
            }
            Err(e) => {
                eprintln!("stats failed: {e}");
                false
            }
        },

        Commands::Available { device_idx } => match client.available_fraction(device_idx).await {
            Ok(pct) => {
                println!("available {}", format::format_available_fraction(pct));
                true
            }
            Err(e) => {
                eprintln!("available failed: {e}");
                false
            }
        },
    }
}

/// `DeviceStats::type_tokens` is `&'static str` in-process; over the wire it
/// arrives owned as plain strings. Mapping back to the small fixed token set
/// lets the CLI reuse `format::format_device_stats` without a wire-specific
/// formatter.
fn known_type_token(s: &str) -> &'static str {
    match s {
        "CPU" => "CPU",
        "GPU" => "GPU",
        "ACCELERATOR" => "ACCELERATOR",
        "DEFAULT" => "DEFAULT",
        _ => "UNKNOWN",
    }
}
