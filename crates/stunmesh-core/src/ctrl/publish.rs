use std::sync::Arc;

use stunmesh_crypto::encrypt;
use stunmesh_discovery::{DiscoveryError, StunResolver};
use stunmesh_transport::AddressFamily;
use tracing::{debug, info, warn};

use crate::entity::{Device, EndpointData, Peer, PeerId};
use crate::error::Result;
use crate::repo::{Devices, Peers};
use crate::store::PluginManager;

/// Discovers each device's public endpoints and seals them into every
/// peer's store slot.
#[derive(Clone)]
pub struct PublishController {
    devices: Arc<Devices>,
    peers: Arc<Peers>,
    resolver: Arc<dyn StunResolver>,
    plugins: Arc<PluginManager>,
}

impl PublishController {
    /// New controller.
    pub fn new(
        devices: Arc<Devices>,
        peers: Arc<Peers>,
        resolver: Arc<dyn StunResolver>,
        plugins: Arc<PluginManager>,
    ) -> Self {
        Self {
            devices,
            peers,
            resolver,
            plugins,
        }
    }

    async fn resolve_family(
        &self,
        device: &Device,
        family: AddressFamily,
    ) -> std::result::Result<std::net::SocketAddr, DiscoveryError> {
        let result = self
            .resolver
            .resolve(&device.name, device.listen_port, family)
            .await;
        match &result {
            Ok(endpoint) => debug!(device = %device.name, %family, %endpoint, "endpoint resolved"),
            Err(e) => warn!(device = %device.name, %family, error = %e, "endpoint resolution failed"),
        }
        result
    }

    /// Public endpoints of `device` per its protocol.
    ///
    /// For dualstack devices both families resolve concurrently and the
    /// device fails only if both do.
    async fn resolve(&self, device: &Device) -> Result<EndpointData> {
        let results = match device.protocol.families() {
            &[first, second] => {
                let (a, b) = tokio::join!(
                    self.resolve_family(device, first),
                    self.resolve_family(device, second)
                );
                vec![a, b]
            }
            families => {
                let mut results = Vec::with_capacity(families.len());
                for &family in families {
                    results.push(self.resolve_family(device, family).await);
                }
                results
            }
        };

        let mut data = EndpointData::default();
        let mut last_error = None;
        for result in results {
            match result {
                Ok(endpoint) => data.set(endpoint),
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) if data.is_empty() => Err(e.into()),
            _ => Ok(data),
        }
    }

    async fn publish_to(&self, device: &Device, peer: &Peer, payload: &str) -> Result<()> {
        let sealed = encrypt(payload, peer.public_key(), &device.private_key)?;
        let store = self.plugins.get(&peer.plugin)?;
        let key = peer.local_key();
        store.set(&key.to_hex(), &sealed).await?;
        info!(device = %device.name, peer = %peer.id, %key, "endpoint published");
        Ok(())
    }

    /// Publish for every device and all of its peers.
    ///
    /// Failures are logged and skipped per device and per peer.
    pub async fn execute(&self) {
        for device in self.devices.list().await {
            let payload = match self.resolve(&device).await.and_then(|d| d.to_json()) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(device = %device.name, error = %e, "skipping publish");
                    continue;
                }
            };
            for peer in self.peers.list_by_device(&device.name).await {
                if let Err(e) = self.publish_to(&device, &peer, &payload).await {
                    warn!(device = %device.name, peer = %peer.id, error = %e, "publish failed");
                }
            }
        }
    }

    /// Publish for one peer only.
    pub async fn execute_for_peer(&self, id: &PeerId) -> Result<()> {
        let peer = self.peers.find(id).await?;
        let device = self.devices.find(&peer.device_name).await?;
        let payload = self.resolve(&device).await?.to_json()?;
        self.publish_to(&device, &peer, &payload).await
    }
}
