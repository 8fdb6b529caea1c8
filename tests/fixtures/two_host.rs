//! Two hosts sharing one store.
//!
//! Each host has its own in-memory WireGuard interface with the other host
//! configured as a peer, its own static STUN answers, and a full set of
//! controllers registered through bootstrap. Only the store is shared.
//!
//! # Example
//!
//! ```no_run
//! use stunmesh_core::{DeviceProtocol, PeerProtocol};
//! use stunmesh_integration_tests::fixtures::TwoHostFixture;
//!
//! # async fn run() {
//! let fixture = TwoHostFixture::new(DeviceProtocol::Ipv4, PeerProtocol::Ipv4).await;
//! fixture.alpha.publish.execute().await;
//! fixture.beta.establish.execute_all().await;
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use stunmesh_core::config::{InterfaceConfig, PeerConfig};
use stunmesh_core::entity::PeerPingConfig;
use stunmesh_core::store::{MemoryStore, PluginManager, Store};
use stunmesh_core::testing::StaticResolver;
use stunmesh_core::wireguard::{DeviceInfo, MemoryWireGuard, PeerInfo, WireGuardClient};
use stunmesh_core::{
    BootstrapController, DeviceProtocol, Devices, EstablishController, PeerId, PeerProtocol,
    Peers, PublishController, RefreshController, WorkReceiver, work_queue,
};
use stunmesh_crypto::{PrivateKey, PublicKey};

/// Interface name on both hosts
pub const INTERFACE: &str = "wg0";

/// Plugin name on both hosts
pub const PLUGIN: &str = "shared";

/// One simulated host.
pub struct Host {
    /// Interface private key
    pub private_key: PrivateKey,
    /// WireGuard double
    pub wireguard: Arc<MemoryWireGuard>,
    /// STUN double
    pub resolver: Arc<StaticResolver>,
    /// Registered devices
    pub devices: Arc<Devices>,
    /// Registered peers
    pub peers: Arc<Peers>,
    /// Publish controller
    pub publish: PublishController,
    /// Establish controller
    pub establish: EstablishController,
    /// Refresh controller
    pub refresh: RefreshController,
    /// Work queue consumer, until a worker takes it
    pub receiver: Option<WorkReceiver>,
    /// Identity of the single peer
    pub peer_id: PeerId,
}

impl Host {
    async fn new(
        seed: u8,
        remote: PublicKey,
        device_protocol: DeviceProtocol,
        peer_protocol: PeerProtocol,
        store: &Arc<MemoryStore>,
    ) -> Self {
        let private_key = PrivateKey::from_bytes([seed; 32]);
        let wireguard = Arc::new(MemoryWireGuard::new());
        wireguard.add_device(DeviceInfo {
            name: INTERFACE.into(),
            listen_port: 51820,
            private_key: private_key.clone(),
            peers: vec![PeerInfo {
                public_key: remote,
                endpoint: None,
            }],
        });

        let mut plugins = PluginManager::new();
        plugins.insert(PLUGIN, Arc::clone(store) as Arc<dyn Store>);
        let plugins = Arc::new(plugins);

        let devices = Arc::new(Devices::new());
        let peers = Arc::new(Peers::new());
        let interfaces = vec![InterfaceConfig {
            name: INTERFACE.into(),
            protocol: device_protocol,
            peers: vec![PeerConfig {
                name: format!("peer-of-{seed}"),
                public_key: remote,
                plugin: PLUGIN.into(),
                protocol: peer_protocol,
                ping: PeerPingConfig::default(),
            }],
        }];
        let wg: Arc<dyn WireGuardClient> = wireguard.clone();
        let registered = BootstrapController::new(
            Arc::clone(&wg),
            Arc::clone(&devices),
            Arc::clone(&peers),
            interfaces,
        )
        .execute()
        .await;
        assert_eq!(registered, 1);

        let resolver = Arc::new(StaticResolver::new());
        let (queue, receiver) = work_queue();
        let publish = PublishController::new(
            Arc::clone(&devices),
            Arc::clone(&peers),
            resolver.clone(),
            Arc::clone(&plugins),
        );
        let establish = EstablishController::new(
            Arc::clone(&devices),
            Arc::clone(&peers),
            wg,
            plugins,
            queue.clone(),
        );
        let refresh = RefreshController::new(Arc::clone(&peers), queue);

        Self {
            peer_id: PeerId::new(private_key.public_key(), remote),
            private_key,
            wireguard,
            resolver,
            devices,
            peers,
            publish,
            establish,
            refresh,
            receiver: Some(receiver),
        }
    }

    /// Interface public key
    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    /// Endpoint WireGuard currently has for the peer
    pub async fn peer_endpoint(&self) -> Option<SocketAddr> {
        let device = self.wireguard.device(INTERFACE).await.ok()?;
        device.peers.first().and_then(|p| p.endpoint)
    }
}

/// Hosts `alpha` and `beta`, peered with each other.
pub struct TwoHostFixture {
    /// First host
    pub alpha: Host,
    /// Second host
    pub beta: Host,
    /// Store both hosts use
    pub store: Arc<MemoryStore>,
}

impl TwoHostFixture {
    /// Both hosts with the same protocols.
    pub async fn new(device_protocol: DeviceProtocol, peer_protocol: PeerProtocol) -> Self {
        let store = Arc::new(MemoryStore::new());
        let alpha_key = PrivateKey::from_bytes([0xa1; 32]).public_key();
        let beta_key = PrivateKey::from_bytes([0xb2; 32]).public_key();
        let alpha = Host::new(0xa1, beta_key, device_protocol, peer_protocol, &store).await;
        let beta = Host::new(0xb2, alpha_key, device_protocol, peer_protocol, &store).await;
        Self { alpha, beta, store }
    }
}
