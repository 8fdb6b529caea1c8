//! WireGuard control plane.
//!
//! The engine only needs three things from WireGuard: the list of
//! interfaces, one interface's keys, port and peers, and an update-only
//! endpoint change for one peer. [`WgCli`] does this with the `wg` tool;
//! [`MemoryWireGuard`] is the in-process double.

mod memory;
mod wg;

pub use memory::MemoryWireGuard;
pub use wg::{WgCli, parse_dump};

use std::net::SocketAddr;

use async_trait::async_trait;
use stunmesh_crypto::{PrivateKey, PublicKey};
use thiserror::Error;

/// Control plane errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireGuardError {
    /// No such interface
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// Update-only change for a peer the interface does not have
    #[error("peer {peer} not configured on {device}")]
    PeerNotFound {
        /// Interface name
        device: String,
        /// Peer public key (base64)
        peer: String,
    },

    /// `wg` output could not be understood
    #[error("unparseable wg output: {0}")]
    Parse(String),

    /// `wg` could not be run or exited non-zero
    #[error("wg command failed: {0}")]
    Command(String),
}

/// One peer as the interface reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer public key
    pub public_key: PublicKey,
    /// Current endpoint, if any
    pub endpoint: Option<SocketAddr>,
}

/// One interface as the control plane reports it.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Interface name
    pub name: String,
    /// UDP listen port
    pub listen_port: u16,
    /// Interface private key
    pub private_key: PrivateKey,
    /// Configured peers
    pub peers: Vec<PeerInfo>,
}

impl DeviceInfo {
    /// Whether `key` is a configured peer.
    #[must_use]
    pub fn has_peer(&self, key: &PublicKey) -> bool {
        self.peers.iter().any(|p| &p.public_key == key)
    }
}

/// Endpoint change for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUpdate {
    /// Peer to change
    pub public_key: PublicKey,
    /// New endpoint
    pub endpoint: SocketAddr,
    /// Fail instead of creating the peer when it is missing
    pub update_only: bool,
}

/// Access to the local WireGuard interfaces.
#[async_trait]
pub trait WireGuardClient: Send + Sync {
    /// Names of all interfaces.
    async fn devices(&self) -> Result<Vec<String>, WireGuardError>;

    /// Details of interface `name`.
    async fn device(&self, name: &str) -> Result<DeviceInfo, WireGuardError>;

    /// Apply `update` to interface `name`.
    async fn configure_device(&self, name: &str, update: PeerUpdate) -> Result<(), WireGuardError>;
}
