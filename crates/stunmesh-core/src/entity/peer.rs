//! Remote peers and their content-addressing identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stunmesh_crypto::{PublicKey, SlotKey, slot_key};

use super::ping::PeerPingConfig;

/// Identity of a (local device, remote peer) pair.
///
/// The two content-addressing keys are mirror images: what this host writes
/// under [`local_key`](Self::local_key) the peer reads under its
/// [`remote_key`](Self::remote_key), and vice versa.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId {
    /// Local device public key
    pub device: PublicKey,
    /// Remote peer public key
    pub peer: PublicKey,
}

impl PeerId {
    /// Pair a device key with a peer key.
    #[must_use]
    pub const fn new(device: PublicKey, peer: PublicKey) -> Self {
        Self { device, peer }
    }

    /// Slot this host publishes its endpoint to: `SHA1(device || peer)`.
    #[must_use]
    pub fn local_key(&self) -> SlotKey {
        slot_key(&self.device, &self.peer)
    }

    /// Slot the peer publishes to: `SHA1(peer || device)`.
    #[must_use]
    pub fn remote_key(&self) -> SlotKey {
        slot_key(&self.peer, &self.device)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device.short(), self.peer.short())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

/// Address family selection when applying a peer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerProtocol {
    /// Require IPv4
    #[default]
    Ipv4,
    /// Require IPv6
    Ipv6,
    /// IPv4, falling back to IPv6
    PreferIpv4,
    /// IPv6, falling back to IPv4
    PreferIpv6,
}

impl fmt::Display for PeerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::PreferIpv4 => "prefer_ipv4",
            Self::PreferIpv6 => "prefer_ipv6",
        })
    }
}

impl FromStr for PeerProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            "prefer_ipv4" => Ok(Self::PreferIpv4),
            "prefer_ipv6" => Ok(Self::PreferIpv6),
            other => Err(format!(
                "unknown peer protocol '{other}' (expected ipv4, ipv6, prefer_ipv4 or prefer_ipv6)"
            )),
        }
    }
}

/// A remote WireGuard peer declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Pair identity
    pub id: PeerId,
    /// Configured name, for logs
    pub name: String,
    /// Local interface the peer belongs to
    pub device_name: String,
    /// Store plugin holding this pair's slots
    pub plugin: String,
    /// Address family selection
    pub protocol: PeerProtocol,
    /// Health probing
    pub ping: PeerPingConfig,
}

impl Peer {
    /// Remote peer public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.id.peer
    }

    /// See [`PeerId::local_key`].
    #[must_use]
    pub fn local_key(&self) -> SlotKey {
        self.id.local_key()
    }

    /// See [`PeerId::remote_key`].
    #[must_use]
    pub fn remote_key(&self) -> SlotKey {
        self.id.remote_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_id() -> PeerId {
        let mut peer = [0u8; 32];
        peer[0] = 1;
        PeerId::new(PublicKey::from_bytes([0u8; 32]), PublicKey::from_bytes(peer))
    }

    #[test]
    fn test_content_keys_vector() {
        let id = vector_id();
        assert_eq!(id.local_key().to_hex(), "37b7dcf21e0e183a9a86170997df242a84a85ff7");
        assert_eq!(id.remote_key().to_hex(), "9c8d8e5a31c9802b093c4116dfb0a23a311b8029");
    }

    #[test]
    fn test_keys_mirror_between_hosts() {
        let ours = vector_id();
        let theirs = PeerId::new(ours.peer, ours.device);
        assert_eq!(ours.local_key(), theirs.remote_key());
        assert_eq!(ours.remote_key(), theirs.local_key());
        assert_ne!(ours.local_key(), ours.remote_key());
    }

    #[test]
    fn test_peer_id_is_map_key() {
        let mut map = std::collections::HashMap::new();
        map.insert(vector_id(), 1);
        assert_eq!(map.get(&vector_id()), Some(&1));
    }

    #[test]
    fn test_peer_protocol_parse() {
        assert_eq!("prefer_ipv6".parse::<PeerProtocol>(), Ok(PeerProtocol::PreferIpv6));
        assert!("dualstack".parse::<PeerProtocol>().is_err());
    }
}
