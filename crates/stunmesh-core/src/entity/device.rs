//! Local WireGuard devices.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stunmesh_crypto::{PrivateKey, PublicKey};
use stunmesh_transport::AddressFamily;

/// Address families a device publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProtocol {
    /// IPv4 only
    #[default]
    Ipv4,
    /// IPv6 only
    Ipv6,
    /// Both, resolved independently
    Dualstack,
}

impl DeviceProtocol {
    /// Families to resolve, in order.
    #[must_use]
    pub fn families(self) -> &'static [AddressFamily] {
        match self {
            Self::Ipv4 => &[AddressFamily::V4],
            Self::Ipv6 => &[AddressFamily::V6],
            Self::Dualstack => &[AddressFamily::V4, AddressFamily::V6],
        }
    }
}

impl fmt::Display for DeviceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Dualstack => "dualstack",
        })
    }
}

impl FromStr for DeviceProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            "dualstack" => Ok(Self::Dualstack),
            other => Err(format!("unknown device protocol '{other}' (expected ipv4, ipv6 or dualstack)")),
        }
    }
}

/// A local WireGuard interface, read once at bootstrap.
#[derive(Debug, Clone)]
pub struct Device {
    /// Interface name
    pub name: String,
    /// UDP listen port
    pub listen_port: u16,
    /// Interface private key
    pub private_key: PrivateKey,
    /// Families to publish
    pub protocol: DeviceProtocol,
}

impl Device {
    /// Public key derived from the interface private key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }
}
