//! Configuration file for the stunmesh daemon.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use stunmesh_core::config::{DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT, DEFAULT_REFRESH_INTERVAL};
use stunmesh_core::entity::{PeerPingConfig, RetryPolicy};
use stunmesh_core::store::DEFAULT_PLUGIN_TIMEOUT;
use stunmesh_core::{
    DeviceProtocol, InterfaceConfig, MonitorConfig, PeerConfig, PeerProtocol, PluginConfig,
    PluginRegistry,
};
use stunmesh_crypto::PublicKey;

/// stunmesh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between publish + establish sweeps
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// STUN server
    #[serde(default)]
    pub stun: StunConfig,
    /// Ping monitor defaults
    #[serde(default)]
    pub ping_monitor: PingMonitorConfig,
    /// Managed WireGuard interfaces by name
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceSection>,
    /// Store plugins by name
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSection>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// STUN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunConfig {
    /// Server as `host:port`
    #[serde(default = "default_stun_address")]
    pub address: String,
    /// Reply deadline
    #[serde(default = "default_stun_timeout")]
    pub timeout_secs: u64,
}

/// Ping monitor defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMonitorConfig {
    /// Probe interval for peers that set none
    #[serde(default = "default_ping_interval")]
    pub interval_secs: u64,
    /// Probe timeout for peers that set none
    #[serde(default = "default_ping_timeout")]
    pub timeout_secs: u64,
    /// Retries spaced at the fixed delay before backoff starts
    #[serde(default = "default_fixed_retries")]
    pub fixed_retries: u32,
}

/// One WireGuard interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSection {
    /// `ipv4`, `ipv6` or `dualstack`
    #[serde(default = "default_device_protocol")]
    pub protocol: String,
    /// Declared peers by name
    #[serde(default)]
    pub peers: BTreeMap<String, PeerSection>,
}

/// One peer of an interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSection {
    /// Base64 public key
    pub public_key: String,
    /// Plugin name
    pub plugin: String,
    /// `ipv4`, `ipv6`, `prefer_ipv4` or `prefer_ipv6`
    #[serde(default = "default_peer_protocol")]
    pub protocol: String,
    /// Health probing
    #[serde(default)]
    pub ping: PingSection,
}

/// Per-peer health probing; zero durations use the monitor defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingSection {
    /// Probe this peer
    #[serde(default)]
    pub enabled: bool,
    /// Address to probe, usually the peer's tunnel address
    #[serde(default)]
    pub target: String,
    /// Probe interval
    #[serde(default)]
    pub interval_secs: u64,
    /// Probe timeout
    #[serde(default)]
    pub timeout_secs: u64,
}

/// One store plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSection {
    /// Plugin type (`exec`, `shell`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Program (exec) or script (shell)
    #[serde(default)]
    pub command: String,
    /// Program arguments (exec)
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-call timeout
    #[serde(default = "default_plugin_timeout")]
    pub timeout_secs: u64,
}

// Default values

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stun_address() -> String {
    "stun.l.google.com:19302".to_string()
}

fn default_stun_timeout() -> u64 {
    5
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL.as_secs()
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT.as_secs()
}

fn default_fixed_retries() -> u32 {
    RetryPolicy::default().fixed_retries
}

fn default_device_protocol() -> String {
    DeviceProtocol::default().to_string()
}

fn default_peer_protocol() -> String {
    PeerProtocol::default().to_string()
}

fn default_plugin_timeout() -> u64 {
    DEFAULT_PLUGIN_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            log: LogConfig::default(),
            stun: StunConfig::default(),
            ping_monitor: PingMonitorConfig::default(),
            interfaces: BTreeMap::new(),
            plugins: BTreeMap::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            address: default_stun_address(),
            timeout_secs: default_stun_timeout(),
        }
    }
}

impl Default for PingMonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ping_interval(),
            timeout_secs: default_ping_timeout(),
            fixed_retries: default_fixed_retries(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("stunmesh/config.toml")
    }

    /// Validate configuration against the plugin types in `registry`
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self, registry: &PluginRegistry) -> anyhow::Result<()> {
        if self.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be greater than 0");
        }
        if self.stun.address.trim().is_empty() {
            bail!("stun.address must not be empty");
        }
        if self.ping_monitor.interval_secs == 0 {
            bail!("ping_monitor.interval_secs must be greater than 0");
        }

        if !LOG_LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.log.level,
                LOG_LEVELS.join(", ")
            );
        }

        for (name, plugin) in &self.plugins {
            if !registry.contains(&plugin.kind) {
                bail!(
                    "plugin {name}: unknown type '{}'. Must be one of: {}",
                    plugin.kind,
                    registry.kinds().join(", ")
                );
            }
        }

        // Parses keys, protocols and plugin references.
        self.interfaces()?;
        Ok(())
    }

    /// Typed interface definitions
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable keys or protocols and for peers
    /// naming an undefined plugin.
    pub fn interfaces(&self) -> anyhow::Result<Vec<InterfaceConfig>> {
        let mut interfaces = Vec::with_capacity(self.interfaces.len());
        for (name, section) in &self.interfaces {
            let protocol: DeviceProtocol = section
                .protocol
                .parse()
                .map_err(|e: String| anyhow::anyhow!("interface {name}: {e}"))?;

            let mut peers = Vec::with_capacity(section.peers.len());
            for (peer_name, peer) in &section.peers {
                let public_key = PublicKey::from_base64(&peer.public_key)
                    .with_context(|| format!("interface {name}, peer {peer_name}: public_key"))?;
                let protocol: PeerProtocol = peer
                    .protocol
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("interface {name}, peer {peer_name}: {e}"))?;
                if !self.plugins.contains_key(&peer.plugin) {
                    bail!("interface {name}, peer {peer_name}: plugin '{}' is not defined", peer.plugin);
                }
                if peer.ping.enabled && peer.ping.target.trim().is_empty() {
                    bail!("interface {name}, peer {peer_name}: ping enabled without a target");
                }
                peers.push(PeerConfig {
                    name: peer_name.clone(),
                    public_key,
                    plugin: peer.plugin.clone(),
                    protocol,
                    ping: PeerPingConfig {
                        enabled: peer.ping.enabled,
                        target: peer.ping.target.clone(),
                        interval: Duration::from_secs(peer.ping.interval_secs),
                        timeout: Duration::from_secs(peer.ping.timeout_secs),
                    },
                });
            }

            interfaces.push(InterfaceConfig {
                name: name.clone(),
                protocol,
                peers,
            });
        }
        Ok(interfaces)
    }

    /// Plugin definitions in the form the registry takes
    #[must_use]
    pub fn plugin_configs(&self) -> BTreeMap<String, PluginConfig> {
        self.plugins
            .iter()
            .map(|(name, plugin)| {
                let config = PluginConfig {
                    kind: plugin.kind.clone(),
                    command: plugin.command.clone(),
                    args: plugin.args.clone(),
                    timeout: Duration::from_secs(plugin.timeout_secs),
                };
                (name.clone(), config)
            })
            .collect()
    }

    /// Ping monitor settings
    #[must_use]
    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            default_interval: Duration::from_secs(self.ping_monitor.interval_secs),
            default_timeout: Duration::from_secs(self.ping_monitor.timeout_secs),
            retry: RetryPolicy {
                fixed_retries: self.ping_monitor.fixed_retries,
            },
            refresh_interval: self.refresh_interval(),
        }
    }

    /// Time between refresh sweeps
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// STUN reply deadline
    #[must_use]
    pub fn stun_timeout(&self) -> Duration {
        Duration::from_secs(self.stun.timeout_secs)
    }
}
