//! Discovery error types.

use std::net::SocketAddr;

use stunmesh_transport::{AddressFamily, TransportError};

use crate::stun::StunError;

/// Endpoint discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// No reply before the deadline
    #[error("no STUN reply from {server} within {timeout_ms} ms")]
    Timeout {
        /// STUN server queried
        server: SocketAddr,
        /// Deadline in milliseconds
        timeout_ms: u128,
    },

    /// Success response without XOR-MAPPED-ADDRESS
    #[error("STUN response from {0} carries no XOR-MAPPED-ADDRESS")]
    MissingXorMappedAddress(SocketAddr),

    /// Server answered with a Binding Error Response
    #[error("STUN error response {code}: {reason}")]
    ErrorResponse {
        /// ERROR-CODE value (0 if absent)
        code: u16,
        /// Reason phrase
        reason: String,
    },

    /// Reply with our transaction ID failed to decode
    #[error("malformed STUN reply: {0}")]
    Malformed(#[from] StunError),

    /// Raw socket or capture failure, including no capturable interface
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// STUN server name did not resolve to an address of the family
    #[error("STUN server {server} has no {family} address")]
    NoServerAddress {
        /// Configured server
        server: String,
        /// Requested family
        family: AddressFamily,
    },

    /// Name resolution failed
    #[error("resolving STUN server {server}: {source}")]
    Lookup {
        /// Configured server
        server: String,
        /// Resolver error
        source: std::io::Error,
    },

    /// Blocking discovery task did not complete
    #[error("discovery task failed: {0}")]
    Task(String),
}

impl DiscoveryError {
    /// Whether retrying later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Lookup { .. } | Self::Task(_) => true,
            Self::Transport(TransportError::PermissionDenied(_) | TransportError::Unsupported) => false,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}
