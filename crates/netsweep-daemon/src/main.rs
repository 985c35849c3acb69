//! netsweep - scan IPv4 subnets for MCUmgr devices
//!
//! Runs a single discovery pass and prints what answered.

mod config;

use anyhow::Result;
use clap::Parser;
use netsweep_core::{Device, Transport};
use netsweep_discovery::{CancellationToken, DiscoveryEvent, DiscoveryScanner};
use netsweep_mcumgr::McumgrDiscovery;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "netsweep")]
#[command(about = "Concurrent subnet discovery for MCUmgr devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "netsweep.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Subnet to scan in CIDR notation (repeatable, replaces configured subnets)
    #[arg(short, long = "subnet")]
    subnet: Vec<String>,

    /// Port to probe (repeatable, replaces configured ports)
    #[arg(short, long = "port")]
    port: Vec<String>,

    /// Per-connection timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum concurrent probe workers
    #[arg(long)]
    async_limit: Option<usize>,

    /// Transport used to dial (tcp or udp)
    #[arg(long)]
    transport: Option<Transport>,

    /// Print discovered devices as JSON
    #[arg(long)]
    json: bool,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr so --json output stays clean
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if args.init_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    info!("netsweep v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if !args.subnet.is_empty() {
        config.discovery.subnets = args.subnet;
    }
    if !args.port.is_empty() {
        config.mcumgr.ports = args.port;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.discovery.timeout_ms = timeout_ms;
    }
    if let Some(async_limit) = args.async_limit {
        config.discovery.async_limit = async_limit;
    }
    if let Some(transport) = args.transport {
        config.mcumgr.transport = transport;
    }

    info!(
        subnets = ?config.discovery.subnets,
        ports = ?config.mcumgr.ports,
        transport = %config.mcumgr.transport,
        "Configuration loaded"
    );

    let protocol = Arc::new(McumgrDiscovery::with_known_hosts(
        config.mcumgr.known_hosts.iter().copied(),
    ));
    let scanner = DiscoveryScanner::new(protocol, config.to_scan_params());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight probes");
            interrupt.cancel();
        }
    });

    let mut events = scanner.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                DiscoveryEvent::ScanStarted {
                    estimated_probes,
                    workers,
                } => info!(estimated_probes, workers, "Scan started"),
                DiscoveryEvent::HostResponded { ip, results } => {
                    debug!(%ip, results, "Host responded")
                }
                DiscoveryEvent::ScanCompleted { found } => info!(found, "Scan completed"),
            }
        }
    });

    let devices = scanner.scan(cancel).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        print_devices(&devices);
    }

    Ok(())
}

fn print_devices(devices: &[Device]) {
    println!("Discovered {} devices:", devices.len());
    for device in devices {
        println!("  - {} ({}) at {}", device.name, device.id, device.endpoint);
        if let Some(board) = &device.info.board {
            println!("    Board: {}", board);
        }
        if let Some(version) = device.firmware_version() {
            println!("    Firmware: {}", version);
        }
    }
}
