//! stunmesh daemon
//!
//! Keeps WireGuard peers behind NAT pointed at each other's public endpoints.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stunmesh_core::wireguard::WireGuardClient;
use stunmesh_core::{
    BootstrapController, Devices, EstablishController, IcmpProbe, PeerId, Peers,
    PingMonitorController, PluginManager, PluginRegistry, PublishController, RefreshController,
    Shutdown, WgCli, work_queue,
};
use stunmesh_discovery::{RawStunResolver, StunResolver};
use stunmesh_transport::AddressFamily;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

/// stunmesh - serverless WireGuard endpoint exchange
#[derive(Parser)]
#[command(name = "stunmesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Daemon,

    /// Validate the configuration and show what would be managed
    Check,

    /// Run one STUN discovery and print the public endpoint
    Discover {
        /// Local UDP port, usually a WireGuard listen port
        #[arg(short, long)]
        port: u16,

        /// Discover the IPv6 endpoint instead of IPv4
        #[arg(long)]
        ipv6: bool,

        /// Interface to leave out of the capture
        #[arg(short, long, default_value = "")]
        interface: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let path = Config::default_path();
            if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };

    // RUST_LOG wins over --verbose, which wins over the config file.
    let level = if cli.verbose { "debug" } else { config.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = PluginRegistry::with_builtins();
    config.validate(&registry)?;

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(&config, &registry).await,
        Commands::Check => check(&config).await,
        Commands::Discover {
            port,
            ipv6,
            interface,
        } => discover(&config, port, ipv6, &interface).await,
    }
}

/// Run daemon mode
async fn run_daemon(config: &Config, registry: &PluginRegistry) -> anyhow::Result<()> {
    info!("Starting stunmesh {}", env!("CARGO_PKG_VERSION"));

    let plugins = PluginManager::from_configs(registry, &config.plugin_configs())
        .context("loading store plugins")?;
    let plugins = Arc::new(plugins);
    let wireguard: Arc<dyn WireGuardClient> = Arc::new(WgCli::new());
    let resolver: Arc<dyn StunResolver> =
        Arc::new(RawStunResolver::new(&config.stun.address).with_timeout(config.stun_timeout()));
    let devices = Arc::new(Devices::new());
    let peers = Arc::new(Peers::new());

    let bootstrap = BootstrapController::new(
        Arc::clone(&wireguard),
        Arc::clone(&devices),
        Arc::clone(&peers),
        config.interfaces()?,
    );
    if bootstrap.execute().await == 0 {
        warn!("no WireGuard device registered; waiting for shutdown");
    }

    let (queue, receiver) = work_queue();
    let publish = PublishController::new(
        Arc::clone(&devices),
        Arc::clone(&peers),
        resolver,
        Arc::clone(&plugins),
    );
    let establish = EstablishController::new(
        Arc::clone(&devices),
        Arc::clone(&peers),
        wireguard,
        plugins,
        queue.clone(),
    );
    let refresh = RefreshController::new(Arc::clone(&peers), queue);

    publish.execute().await;
    establish.execute_all().await;

    let shutdown = Shutdown::new();
    let monitor = PingMonitorController::new(
        Arc::new(IcmpProbe::new()),
        publish.clone(),
        establish.clone(),
        config.monitor(),
        shutdown.subscribe(),
    );

    let mut tasks = Vec::new();
    for peer in peers.list().await {
        if let Some(task) = monitor.add_peer(&peer).await {
            tasks.push(task);
        }
    }
    info!(monitored = tasks.len(), "ping monitor running");

    tasks.push(establish.run_worker(receiver, shutdown.subscribe()));
    tasks.push(refresh.run(publish, config.refresh_interval(), shutdown.subscribe()));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");
    shutdown.trigger();

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "task ended abnormally");
        }
    }
    Ok(())
}

/// Print the resolved configuration
async fn check(config: &Config) -> anyhow::Result<()> {
    println!("stunmesh {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Refresh interval: {}s", config.refresh_interval_secs);
    println!("STUN server: {} (timeout {}s)", config.stun.address, config.stun.timeout_secs);
    println!();

    println!("Plugins:");
    for (name, plugin) in config.plugin_configs() {
        println!("  {name}: {} {} (timeout {}s)", plugin.kind, plugin.command, plugin.timeout.as_secs());
    }
    println!();

    let wireguard = WgCli::new();
    println!("Interfaces:");
    for interface in config.interfaces()? {
        println!("  {} ({})", interface.name, interface.protocol);
        // Slot keys need the interface's own key, which only WireGuard knows.
        let device_key = match wireguard.device(&interface.name).await {
            Ok(info) => Some(info.private_key.public_key()),
            Err(e) => {
                println!("    device unavailable: {e}");
                None
            }
        };
        for peer in &interface.peers {
            println!("    {} via {} ({})", peer.name, peer.plugin, peer.protocol);
            if let Some(device_key) = device_key {
                let id = PeerId::new(device_key, peer.public_key);
                println!("      publish key: {}", id.local_key());
                println!("      lookup key:  {}", id.remote_key());
            }
            if peer.ping.enabled {
                println!("      ping: {}", peer.ping.target);
            }
        }
    }
    Ok(())
}

/// Run a single discovery
async fn discover(config: &Config, port: u16, ipv6: bool, interface: &str) -> anyhow::Result<()> {
    let family = if ipv6 { AddressFamily::V6 } else { AddressFamily::V4 };
    let resolver =
        RawStunResolver::new(&config.stun.address).with_timeout(config.stun_timeout());
    let endpoint = resolver
        .resolve(interface, port, family)
        .await
        .with_context(|| format!("discovering {family} endpoint of port {port} via {}", resolver.server()))?;
    println!("{endpoint}");
    Ok(())
}
