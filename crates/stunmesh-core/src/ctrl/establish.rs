use std::sync::Arc;

use stunmesh_crypto::decrypt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entity::{EndpointData, PeerId};
use crate::error::{Error, Result};
use crate::queue::{WorkQueue, WorkReceiver};
use crate::repo::{Devices, Peers};
use crate::shutdown::ShutdownSignal;
use crate::store::{PluginManager, StoreError};
use crate::wireguard::{PeerUpdate, WireGuardClient};

/// Reads each peer's published endpoint and applies it to WireGuard.
#[derive(Clone)]
pub struct EstablishController {
    devices: Arc<Devices>,
    peers: Arc<Peers>,
    wireguard: Arc<dyn WireGuardClient>,
    plugins: Arc<PluginManager>,
    queue: WorkQueue,
}

impl EstablishController {
    /// New controller; [`trigger`](Self::trigger) feeds `queue`.
    pub fn new(
        devices: Arc<Devices>,
        peers: Arc<Peers>,
        wireguard: Arc<dyn WireGuardClient>,
        plugins: Arc<PluginManager>,
        queue: WorkQueue,
    ) -> Self {
        Self {
            devices,
            peers,
            wireguard,
            plugins,
            queue,
        }
    }

    /// Fetch, open and apply the endpoint published for `id`.
    ///
    /// A missing slot or an unreachable store is logged and returns `Ok`:
    /// the peer may simply not have published yet.
    pub async fn execute(&self, id: &PeerId) -> Result<()> {
        let peer = self.peers.find(id).await?;
        let device = self.devices.find(&peer.device_name).await?;
        let store = self.plugins.get(&peer.plugin)?;

        let key = peer.remote_key();
        let sealed = match store.get(&key.to_hex()).await {
            Ok(sealed) => sealed,
            Err(e @ (StoreError::NotFound(_) | StoreError::Unavailable(_))) => {
                warn!(device = %device.name, peer = %id, %key, error = %e, "no endpoint to establish");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let content = decrypt(&sealed, peer.public_key(), &device.private_key)?;
        let data = EndpointData::parse(&content)?;
        let endpoint = data.select(peer.protocol).ok_or(Error::NoEndpoint {
            peer: *id,
            protocol: peer.protocol,
        })?;

        self.wireguard
            .configure_device(
                &device.name,
                PeerUpdate {
                    public_key: *peer.public_key(),
                    endpoint,
                    update_only: true,
                },
            )
            .await?;
        info!(device = %device.name, peer = %id, %endpoint, "peer endpoint updated");
        Ok(())
    }

    /// Establish every known peer, logging failures.
    pub async fn execute_all(&self) {
        for peer in self.peers.list().await {
            if let Err(e) = self.execute(&peer.id).await {
                warn!(device = %peer.device_name, peer = %peer.id, error = %e, "establish failed");
            }
        }
    }

    /// Queue `id` for the worker. Returns `false` if it is already queued.
    pub fn trigger(&self, id: PeerId) -> bool {
        self.queue.push(id)
    }

    /// Drain `receiver` until shutdown.
    pub fn run_worker(&self, mut receiver: WorkReceiver, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let ctrl = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    next = receiver.recv() => {
                        let Some(id) = next else { break };
                        if let Err(e) = ctrl.execute(&id).await {
                            warn!(peer = %id, error = %e, "establish failed");
                        }
                    }
                }
            }
            debug!("establish worker stopped");
        })
    }
}
