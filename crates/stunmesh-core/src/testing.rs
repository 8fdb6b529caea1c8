//! In-process doubles for the discovery and probe seams.
//!
//! Together with [`MemoryStore`](crate::store::MemoryStore) and
//! [`MemoryWireGuard`](crate::wireguard::MemoryWireGuard) these let a whole
//! daemon run without sockets, subprocesses or privileges.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stunmesh_discovery::{DiscoveryError, StunResolver};
use stunmesh_transport::AddressFamily;

use crate::probe::HealthProbe;

/// Resolver answering from a fixed table.
///
/// Families without an entry fail like a server with no address of that
/// family. Interfaces marked with [`fail_on`](Self::fail_on) fail for
/// every family.
#[derive(Debug, Default)]
pub struct StaticResolver {
    endpoints: Mutex<HashMap<AddressFamily, SocketAddr>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl StaticResolver {
    /// Resolver with no endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver answering `endpoint` for its family.
    #[must_use]
    pub fn with(self, endpoint: SocketAddr) -> Self {
        self.set(endpoint);
        self
    }

    /// Fail every request made for `interface`.
    #[must_use]
    pub fn fail_on(self, interface: &str) -> Self {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(interface.to_string());
        }
        self
    }

    /// Answer `endpoint` for its family from now on.
    pub fn set(&self, endpoint: SocketAddr) {
        if let Ok(mut endpoints) = self.endpoints.lock() {
            endpoints.insert(AddressFamily::of(&endpoint.ip()), endpoint);
        }
    }

    /// Fail every request for `family` from now on.
    pub fn clear(&self, family: AddressFamily) {
        if let Ok(mut endpoints) = self.endpoints.lock() {
            endpoints.remove(&family);
        }
    }

    /// Requests served so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StunResolver for StaticResolver {
    async fn resolve(
        &self,
        interface: &str,
        _local_port: u16,
        family: AddressFamily,
    ) -> Result<SocketAddr, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .lock()
            .map(|failing| failing.contains(interface))
            .unwrap_or(false);
        let endpoint = self
            .endpoints
            .lock()
            .ok()
            .filter(|_| !failing)
            .and_then(|endpoints| endpoints.get(&family).copied());
        endpoint.ok_or_else(|| DiscoveryError::NoServerAddress {
            server: "static".into(),
            family,
        })
    }
}

/// Probe with a switchable answer.
#[derive(Debug)]
pub struct ScriptedProbe {
    reachable: AtomicBool,
    delay: Mutex<Duration>,
    probes: AtomicUsize,
}

impl ScriptedProbe {
    /// Probe answering `reachable`.
    #[must_use]
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            delay: Mutex::new(Duration::ZERO),
            probes: AtomicUsize::new(0),
        }
    }

    /// Change the answer.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
    }

    /// Probes run so far.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _target: &str, timeout: Duration) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return false;
            }
            tokio::time::sleep(delay).await;
        }
        self.reachable.load(Ordering::SeqCst)
    }
}
