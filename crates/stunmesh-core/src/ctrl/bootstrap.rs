use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::InterfaceConfig;
use crate::entity::{Device, DeviceProtocol, Peer, PeerId};
use crate::error::Error;
use crate::repo::{Devices, Peers};
use crate::wireguard::WireGuardClient;

/// Reads the WireGuard interfaces once and fills the repositories.
#[derive(Clone)]
pub struct BootstrapController {
    wireguard: Arc<dyn WireGuardClient>,
    devices: Arc<Devices>,
    peers: Arc<Peers>,
    interfaces: Arc<[InterfaceConfig]>,
}

impl BootstrapController {
    /// Controller for the configured `interfaces`; when empty, every
    /// interface the control plane reports is registered.
    pub fn new(
        wireguard: Arc<dyn WireGuardClient>,
        devices: Arc<Devices>,
        peers: Arc<Peers>,
        interfaces: Vec<InterfaceConfig>,
    ) -> Self {
        Self {
            wireguard,
            devices,
            peers,
            interfaces: interfaces.into(),
        }
    }

    async fn interface_names(&self) -> Vec<String> {
        if !self.interfaces.is_empty() {
            return self.interfaces.iter().map(|i| i.name.clone()).collect();
        }
        match self.wireguard.devices().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "listing WireGuard interfaces failed");
                Vec::new()
            }
        }
    }

    /// Register every interface. Returns the number of devices registered.
    pub async fn execute(&self) -> usize {
        let mut registered = 0;
        for name in self.interface_names().await {
            let info = match self.wireguard.device(&name).await {
                Ok(info) => info,
                Err(source) => {
                    let e = Error::Registration {
                        device: name.clone(),
                        source,
                    };
                    warn!(device = %name, error = %e, "skipping device");
                    continue;
                }
            };

            let config = self.interfaces.iter().find(|i| i.name == name);
            let device = Device {
                name: name.clone(),
                listen_port: info.listen_port,
                private_key: info.private_key.clone(),
                protocol: config.map_or(DeviceProtocol::default(), |c| c.protocol),
            };
            let device_key = device.public_key();
            self.devices.save(device).await;
            registered += 1;

            let declared = config.map_or(&[][..], |c| c.peers.as_slice());
            for peer in declared {
                if !info.has_peer(&peer.public_key) {
                    warn!(device = %name, peer = %peer.name, "declared peer not configured on interface");
                }
                let id = PeerId::new(device_key, peer.public_key);
                self.peers
                    .save(Peer {
                        id,
                        name: peer.name.clone(),
                        device_name: name.clone(),
                        plugin: peer.plugin.clone(),
                        protocol: peer.protocol,
                        ping: peer.ping.clone(),
                    })
                    .await;
                debug!(device = %name, peer = %id, "peer registered");
            }

            for live in &info.peers {
                if !declared.iter().any(|p| p.public_key == live.public_key) {
                    debug!(device = %name, peer = %live.public_key.short(), "undeclared peer skipped");
                }
            }
            info!(device = %name, port = info.listen_port, peers = declared.len(), "device registered");
        }
        registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use crate::entity::{PeerPingConfig, PeerProtocol};
    use crate::wireguard::{DeviceInfo, MemoryWireGuard, PeerInfo};
    use stunmesh_crypto::{PrivateKey, PublicKey};

    fn live(name: &str, peers: &[u8]) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            listen_port: 51820,
            private_key: PrivateKey::from_bytes([7; 32]),
            peers: peers
                .iter()
                .map(|s| PeerInfo { public_key: PublicKey::from_bytes([*s; 32]), endpoint: None })
                .collect(),
        }
    }

    fn declared(seed: u8) -> PeerConfig {
        PeerConfig {
            name: format!("peer{seed}"),
            public_key: PublicKey::from_bytes([seed; 32]),
            plugin: "exec1".into(),
            protocol: PeerProtocol::PreferIpv4,
            ping: PeerPingConfig::default(),
        }
    }

    fn controller(wg: MemoryWireGuard, interfaces: Vec<InterfaceConfig>) -> (BootstrapController, Arc<Devices>, Arc<Peers>) {
        let devices = Arc::new(Devices::new());
        let peers = Arc::new(Peers::new());
        let ctrl = BootstrapController::new(Arc::new(wg), Arc::clone(&devices), Arc::clone(&peers), interfaces);
        (ctrl, devices, peers)
    }

    #[tokio::test]
    async fn test_registers_declared_peers() {
        let wg = MemoryWireGuard::new();
        wg.add_device(live("wg0", &[1, 9]));
        let interfaces = vec![InterfaceConfig {
            name: "wg0".into(),
            protocol: DeviceProtocol::Dualstack,
            peers: vec![declared(1), declared(2)],
        }];
        let (ctrl, devices, peers) = controller(wg, interfaces);

        assert_eq!(ctrl.execute().await, 1);
        let device = devices.find("wg0").await.unwrap();
        assert_eq!(device.protocol, DeviceProtocol::Dualstack);
        assert_eq!(device.listen_port, 51820);

        // Peer 2 is missing on the interface but still registered; peer 9 is
        // not declared and skipped.
        let registered = peers.list_by_device("wg0").await;
        assert_eq!(registered.len(), 2);
        let id = PeerId::new(device.public_key(), PublicKey::from_bytes([1; 32]));
        let peer = peers.find(&id).await.unwrap();
        assert_eq!(peer.plugin, "exec1");
        assert_eq!(peer.protocol, PeerProtocol::PreferIpv4);
    }

    #[tokio::test]
    async fn test_missing_device_skipped() {
        let wg = MemoryWireGuard::new();
        wg.add_device(live("wg1", &[]));
        let interfaces = vec![
            InterfaceConfig { name: "wg0".into(), protocol: DeviceProtocol::Ipv4, peers: vec![] },
            InterfaceConfig { name: "wg1".into(), protocol: DeviceProtocol::Ipv6, peers: vec![] },
        ];
        let (ctrl, devices, _) = controller(wg, interfaces);

        assert_eq!(ctrl.execute().await, 1);
        assert!(devices.find("wg0").await.is_err());
        assert_eq!(devices.find("wg1").await.unwrap().protocol, DeviceProtocol::Ipv6);
    }

    #[tokio::test]
    async fn test_no_configured_interfaces_registers_all() {
        let wg = MemoryWireGuard::new();
        wg.add_device(live("wg0", &[1]));
        wg.add_device(live("wg1", &[]));
        let (ctrl, devices, peers) = controller(wg, vec![]);

        assert_eq!(ctrl.execute().await, 2);
        assert_eq!(devices.list().await.len(), 2);
        assert_eq!(devices.find("wg0").await.unwrap().protocol, DeviceProtocol::Ipv4);
        assert!(peers.list().await.is_empty());
    }
}
