use anyhow::{bail, Result};
use clap::Parser;
use ramses_dispatch::transport::{GatewayTransport, MemoryTransport, DEFAULT_BAUD_RATE};
use ramses_dispatch::{
    CommandDispatcher, CommandRegistry, DeviceCommandManager, DispatchConfig, Priority,
    StaticDirectory, Transport,
};
use ramses_shared::{timing, DEFAULT_GATEWAY_ID};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Send named commands to a RAMSES-II ventilation device
#[derive(Parser, Debug)]
#[command(name = "ramses-dispatch", version)]
struct Cli {
    /// Gateway exposed over TCP, e.g. a ser2net bridge (host:port)
    #[arg(long, conflicts_with_all = ["serial", "dry_run"])]
    tcp: Option<String>,

    /// Gateway attached to a local serial port
    #[arg(long, conflicts_with = "dry_run")]
    serial: Option<String>,

    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Log packets instead of transmitting them
    #[arg(long)]
    dry_run: bool,

    /// Source address used when no companion is bound
    #[arg(long, default_value = DEFAULT_GATEWAY_ID)]
    gateway_id: String,

    #[arg(long, default_value_t = timing::MIN_COMMAND_INTERVAL_MS)]
    min_interval_ms: u64,

    #[arg(long, default_value_t = timing::WORKER_IDLE_TIMEOUT_MS)]
    idle_timeout_ms: u64,

    #[arg(long, default_value_t = timing::COMMAND_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Bind a companion remote to a device: DEVICE=COMPANION (repeatable)
    #[arg(long = "bind", value_parser = parse_binding)]
    bindings: Vec<(String, String)>,

    /// Target device address, e.g. 32:153289
    device: String,

    /// Command names to send, in order (e.g. fan_high filter_reset)
    #[arg(required = true)]
    commands: Vec<String>,
}

fn parse_binding(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((device, companion)) if !device.is_empty() && !companion.is_empty() => {
            Ok((device.to_string(), companion.to_string()))
        }
        _ => Err(format!("expected DEVICE=COMPANION, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let config = DispatchConfig {
        min_interval: Duration::from_millis(cli.min_interval_ms),
        idle_timeout: Duration::from_millis(cli.idle_timeout_ms),
        default_timeout: Duration::from_millis(cli.timeout_ms),
        gateway_id: cli.gateway_id.clone(),
    };
    config.validate()?;

    let transport: Arc<dyn Transport> = match (&cli.tcp, &cli.serial) {
        (Some(address), _) => {
            Arc::new(GatewayTransport::connect_tcp(address, &config.gateway_id).await?)
        }
        (None, Some(path)) => Arc::new(GatewayTransport::open_serial(
            path,
            cli.baud,
            &config.gateway_id,
        )?),
        (None, None) if cli.dry_run => Arc::new(MemoryTransport::logging(&config.gateway_id)),
        (None, None) => bail!("no gateway given: pass --tcp, --serial or --dry-run"),
    };

    info!("Dispatching to {} via {}", cli.device, transport.name());

    let registry = Arc::new(CommandRegistry::new());
    let directory = Arc::new(StaticDirectory::from_pairs(cli.bindings));
    let manager = Arc::new(DeviceCommandManager::new(transport, config.clone()));
    let dispatcher = CommandDispatcher::new(registry, manager.clone(), directory);
    dispatcher.register_builtin_commands().await;

    for name in &cli.commands {
        let result = dispatcher
            .send_command(&cli.device, name, Priority::Normal, config.default_timeout)
            .await;

        match (result.success, result.queued) {
            (true, true) => info!("{} queued", name),
            (true, false) => info!("{} sent in {:?}", name, result.execution_time),
            (false, _) => error!(
                "{} failed: {}",
                name,
                result.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    manager.wait_drained().await;

    let stats = dispatcher.get_queue_statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    manager.shutdown().await;
    Ok(())
}
