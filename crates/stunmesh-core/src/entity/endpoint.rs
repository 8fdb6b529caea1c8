//! Endpoint payload sealed into the envelope.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::peer::PeerProtocol;
use crate::error::{Error, Result};

/// Public endpoints of one device, one per family.
///
/// Empty fields are omitted from the JSON form. IPv6 endpoints use the
/// bracketed `[addr]:port` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointData {
    /// IPv4 endpoint
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    /// IPv6 endpoint
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6: String,
}

impl EndpointData {
    /// Record a discovered endpoint under its family.
    pub fn set(&mut self, endpoint: SocketAddr) {
        match endpoint {
            SocketAddr::V4(_) => self.ipv4 = endpoint.to_string(),
            SocketAddr::V6(_) => self.ipv6 = endpoint.to_string(),
        }
    }

    /// No family resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// JSON form sealed into the envelope.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Parse a decrypted payload.
    ///
    /// Besides the JSON object, a bare `host:port` string is accepted and
    /// filed under its family; older single-family publishers wrote that.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        if content.starts_with('{') {
            return serde_json::from_str(content).map_err(|e| Error::InvalidPayload(e.to_string()));
        }
        let endpoint: SocketAddr = content
            .parse()
            .map_err(|_| Error::InvalidPayload(format!("neither JSON nor host:port: {content:?}")))?;
        let mut data = Self::default();
        data.set(endpoint);
        Ok(data)
    }

    fn ipv4_addr(&self) -> Option<SocketAddr> {
        self.ipv4.parse().ok().filter(SocketAddr::is_ipv4)
    }

    fn ipv6_addr(&self) -> Option<SocketAddr> {
        self.ipv6.parse().ok().filter(SocketAddr::is_ipv6)
    }

    /// Endpoint to apply under `protocol`.
    ///
    /// `ipv4`/`ipv6` require that family; `prefer_*` fall back to the other.
    #[must_use]
    pub fn select(&self, protocol: PeerProtocol) -> Option<SocketAddr> {
        match protocol {
            PeerProtocol::Ipv4 => self.ipv4_addr(),
            PeerProtocol::Ipv6 => self.ipv6_addr(),
            PeerProtocol::PreferIpv4 => self.ipv4_addr().or_else(|| self.ipv6_addr()),
            PeerProtocol::PreferIpv6 => self.ipv6_addr().or_else(|| self.ipv4_addr()),
        }
    }
}
