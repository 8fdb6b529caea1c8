//! Runtime configuration model.
//!
//! These are the validated, typed values the controllers consume. The
//! daemon builds them from its TOML file.

use std::time::Duration;

use stunmesh_crypto::PublicKey;

use crate::entity::{DeviceProtocol, PeerPingConfig, PeerProtocol, RetryPolicy};

/// Default refresh interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Default probe interval
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default probe timeout
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// One WireGuard interface to manage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Interface name
    pub name: String,
    /// Families to publish
    pub protocol: DeviceProtocol,
    /// Declared peers
    pub peers: Vec<PeerConfig>,
}

/// One declared peer of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Name, for logs
    pub name: String,
    /// Peer public key
    pub public_key: PublicKey,
    /// Store plugin name
    pub plugin: String,
    /// Address family selection
    pub protocol: PeerProtocol,
    /// Health probing
    pub ping: PeerPingConfig,
}

/// Ping monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Probe interval for peers that leave theirs at zero
    pub default_interval: Duration,
    /// Probe timeout for peers that leave theirs at zero
    pub default_timeout: Duration,
    /// Retry spacing
    pub retry: RetryPolicy,
    /// Refresh interval; retries further apart than this are handed over
    pub refresh_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_PING_INTERVAL,
            default_timeout: DEFAULT_PING_TIMEOUT,
            retry: RetryPolicy::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}
