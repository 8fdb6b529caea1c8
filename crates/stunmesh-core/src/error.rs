//! Error types for the coordination engine
//!
//! Every controller isolates failures to its unit of work (one device, one
//! peer, one store write), so most of these surface in log lines rather than
//! in return values. `is_transient` tells callers whether the next refresh or
//! ping-triggered retry has a chance of succeeding.

use std::borrow::Cow;

use stunmesh_crypto::CryptoError;
use stunmesh_discovery::DiscoveryError;
use thiserror::Error;

use crate::entity::PeerId;
use crate::store::StoreError;
use crate::wireguard::WireGuardError;

/// Errors raised by controllers and repositories
#[derive(Debug, Error)]
pub enum Error {
    /// Public endpoint discovery failed
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Envelope sealing or opening failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Store access failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Reconfiguring a WireGuard peer failed
    #[error("Configuration error: {0}")]
    Configuration(#[from] WireGuardError),

    /// Bootstrap could not read an interface
    #[error("Registration of device {device} failed: {source}")]
    Registration {
        /// Interface name
        device: String,
        /// Control plane error
        source: WireGuardError,
    },

    /// Device or peer missing from its repository
    #[error("Not found: {0}")]
    NotFound(Cow<'static, str>),

    /// Decrypted endpoint payload is neither JSON nor `host:port`
    #[error("Invalid endpoint payload: {0}")]
    InvalidPayload(String),

    /// Payload carries no address usable under the peer's protocol
    #[error("No usable endpoint for peer {peer} ({protocol})")]
    NoEndpoint {
        /// Peer
        peer: PeerId,
        /// Peer protocol
        protocol: crate::entity::PeerProtocol,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

impl Error {
    /// Returns true if this error may clear up without intervention
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Discovery(e) => e.is_transient(),
            Error::Store(e) => e.is_transient(),
            Error::Configuration(_) | Error::Registration { .. } => true,
            _ => false,
        }
    }

    /// Device missing from the repository
    #[must_use]
    pub fn device_not_found(name: &str) -> Self {
        Error::NotFound(format!("device {name}").into())
    }

    /// Peer missing from the repository
    #[must_use]
    pub fn peer_not_found(id: &PeerId) -> Self {
        Error::NotFound(format!("peer {id}").into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
