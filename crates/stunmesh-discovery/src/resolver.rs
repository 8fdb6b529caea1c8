//! Public endpoint resolution for a WireGuard listen port.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use stunmesh_transport::{AddressFamily, CaptureParams, PacketCapture, PlatformCapture, RawSocket};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::session::{DEFAULT_TIMEOUT, StunSession};

/// Resolves the public (server-reflexive) endpoint of a local UDP port.
#[async_trait]
pub trait StunResolver: Send + Sync {
    /// Discover the public address `local_port` on `interface` maps to.
    ///
    /// `interface` is the WireGuard interface owning the port; captures never
    /// listen on it. An empty name excludes nothing.
    async fn resolve(
        &self,
        interface: &str,
        local_port: u16,
        family: AddressFamily,
    ) -> Result<SocketAddr, DiscoveryError>;
}

/// Production resolver: raw socket + platform capture against one server.
#[derive(Debug, Clone)]
pub struct RawStunResolver {
    server: String,
    timeout: Duration,
}

impl RawStunResolver {
    /// Resolver querying `server` (`host:port`).
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the reply deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured server.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    async fn server_addr(&self, family: AddressFamily) -> Result<SocketAddr, DiscoveryError> {
        let candidates = tokio::net::lookup_host(&self.server)
            .await
            .map_err(|source| DiscoveryError::Lookup {
                server: self.server.clone(),
                source,
            })?;
        candidates
            .into_iter()
            .find(|addr| family.matches(&addr.ip()))
            .ok_or_else(|| DiscoveryError::NoServerAddress {
                server: self.server.clone(),
                family,
            })
    }
}

#[async_trait]
impl StunResolver for RawStunResolver {
    async fn resolve(
        &self,
        interface: &str,
        local_port: u16,
        family: AddressFamily,
    ) -> Result<SocketAddr, DiscoveryError> {
        let server = self.server_addr(family).await?;
        let params = CaptureParams {
            local_port,
            family,
            exclude_interface: (!interface.is_empty()).then(|| interface.to_string()),
        };
        let timeout = self.timeout;

        debug!(interface, local_port, %family, %server, "discovering public endpoint");
        tokio::task::spawn_blocking(move || {
            // Capture first so the reply cannot beat the filter.
            let capture = PlatformCapture::open(&params)?;
            let sink = RawSocket::open(family)?;
            let session = StunSession::new(capture, sink, local_port).with_timeout(timeout);
            let result = session.discover(server);
            session.stop();
            result
        })
        .await
        .map_err(|e| DiscoveryError::Task(e.to_string()))?
    }
}
