//! # stunmesh Core
//!
//! Coordination engine for stunmesh: keeps WireGuard peers behind NAT
//! pointed at each other's current public endpoints.
//!
//! This crate provides:
//! - Device and peer entities with content-addressed store slots
//! - Pluggable key-value stores (exec, shell, in-memory)
//! - WireGuard control through the `wg` tool
//! - Bootstrap, publish, establish and refresh controllers
//! - A ping monitor firing recoveries with retry/backoff
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Controllers                             │
//! │   bootstrap · publish · establish · refresh · ping monitor      │
//! ├──────────────────┬───────────────────┬──────────────────────────┤
//! │   StunResolver   │      Store        │  WireGuardClient / Probe │
//! │  (public addr)   │ (sealed endpoints)│  (apply / health check)  │
//! └──────────────────┴───────────────────┴──────────────────────────┘
//! ```
//!
//! Each host writes its endpoints, sealed for one peer, under
//! `SHA1(own key || peer key)` and reads the peer's under the reverse
//! order, so two hosts sharing a store find each other's slots without any
//! coordination.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ctrl;
pub mod entity;
pub mod error;
pub mod probe;
pub mod queue;
pub mod repo;
pub mod shutdown;
pub mod store;
pub mod testing;
pub mod wireguard;

pub use config::{InterfaceConfig, MonitorConfig, PeerConfig};
pub use ctrl::{
    BootstrapController, EstablishController, PingMonitorController, PublishController,
    RefreshController,
};
pub use entity::{Device, DeviceProtocol, EndpointData, Peer, PeerId, PeerProtocol};
pub use error::{Error, Result};
pub use probe::{HealthProbe, IcmpProbe};
pub use queue::{WorkQueue, WorkReceiver, work_queue};
pub use repo::{Devices, Peers};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use store::{PluginConfig, PluginManager, PluginRegistry, Store, StoreError};
pub use wireguard::{WgCli, WireGuardClient, WireGuardError};
