//! In-memory repositories populated at bootstrap.
//!
//! Ordered maps keep listing order stable, so sweeps visit devices and
//! peers in the same order every time.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::entity::{Device, Peer, PeerId};
use crate::error::{Error, Result};

/// Local devices by interface name.
#[derive(Debug, Default)]
pub struct Devices {
    inner: RwLock<BTreeMap<String, Arc<Device>>>,
}

impl Devices {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device.
    pub async fn save(&self, device: Device) {
        self.inner
            .write()
            .await
            .insert(device.name.clone(), Arc::new(device));
    }

    /// Look up a device by name.
    pub async fn find(&self, name: &str) -> Result<Arc<Device>> {
        self.inner
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::device_not_found(name))
    }

    /// All devices, by name.
    pub async fn list(&self) -> Vec<Arc<Device>> {
        self.inner.read().await.values().cloned().collect()
    }
}

/// Remote peers by pair identity.
#[derive(Debug, Default)]
pub struct Peers {
    inner: RwLock<BTreeMap<PeerId, Arc<Peer>>>,
}

impl Peers {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a peer.
    pub async fn save(&self, peer: Peer) {
        self.inner.write().await.insert(peer.id, Arc::new(peer));
    }

    /// Look up a peer.
    pub async fn find(&self, id: &PeerId) -> Result<Arc<Peer>> {
        self.inner
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::peer_not_found(id))
    }

    /// All peers.
    pub async fn list(&self) -> Vec<Arc<Peer>> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Peers attached to one device.
    pub async fn list_by_device(&self, device_name: &str) -> Vec<Arc<Peer>> {
        self.inner
            .read()
            .await
            .values()
            .filter(|peer| peer.device_name == device_name)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DeviceProtocol, PeerPingConfig, PeerProtocol};
    use stunmesh_crypto::{PrivateKey, PublicKey};

    fn device(name: &str, seed: u8) -> Device {
        Device {
            name: name.into(),
            listen_port: 51820,
            private_key: PrivateKey::from_bytes([seed; 32]),
            protocol: DeviceProtocol::Ipv4,
        }
    }

    fn peer(device: &Device, seed: u8) -> Peer {
        Peer {
            id: PeerId::new(device.public_key(), PublicKey::from_bytes([seed; 32])),
            name: format!("peer{seed}"),
            device_name: device.name.clone(),
            plugin: "memory".into(),
            protocol: PeerProtocol::Ipv4,
            ping: PeerPingConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_devices_save_is_upsert() {
        let devices = Devices::new();
        devices.save(device("wg0", 1)).await;
        let mut replacement = device("wg0", 1);
        replacement.listen_port = 51821;
        devices.save(replacement).await;

        assert_eq!(devices.list().await.len(), 1);
        assert_eq!(devices.find("wg0").await.unwrap().listen_port, 51821);
        assert!(matches!(devices.find("wg1").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_peers_by_device() {
        let wg0 = device("wg0", 1);
        let wg1 = device("wg1", 2);
        let peers = Peers::new();
        peers.save(peer(&wg0, 10)).await;
        peers.save(peer(&wg0, 11)).await;
        peers.save(peer(&wg1, 12)).await;

        assert_eq!(peers.list().await.len(), 3);
        assert_eq!(peers.list_by_device("wg0").await.len(), 2);
        assert!(peers.list_by_device("wg9").await.is_empty());

        let id = peer(&wg1, 12).id;
        assert_eq!(peers.find(&id).await.unwrap().name, "peer12");
    }
}
