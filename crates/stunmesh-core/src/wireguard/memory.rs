use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{DeviceInfo, PeerInfo, PeerUpdate, WireGuardClient, WireGuardError};

/// In-process interfaces for tests.
///
/// Records every applied update so tests can assert on reconfigurations.
#[derive(Debug, Default)]
pub struct MemoryWireGuard {
    devices: Mutex<BTreeMap<String, DeviceInfo>>,
    applied: Mutex<Vec<(String, PeerUpdate)>>,
}

impl MemoryWireGuard {
    /// No interfaces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an interface.
    pub fn add_device(&self, device: DeviceInfo) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(device.name.clone(), device);
        }
    }

    /// Updates applied so far, in order.
    #[must_use]
    pub fn applied(&self) -> Vec<(String, PeerUpdate)> {
        self.applied.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn lock_error() -> WireGuardError {
        WireGuardError::Command("memory wireguard lock poisoned".into())
    }
}

#[async_trait]
impl WireGuardClient for MemoryWireGuard {
    async fn devices(&self) -> Result<Vec<String>, WireGuardError> {
        let devices = self.devices.lock().map_err(|_| Self::lock_error())?;
        Ok(devices.keys().cloned().collect())
    }

    async fn device(&self, name: &str) -> Result<DeviceInfo, WireGuardError> {
        let devices = self.devices.lock().map_err(|_| Self::lock_error())?;
        devices
            .get(name)
            .cloned()
            .ok_or_else(|| WireGuardError::DeviceNotFound(name.to_string()))
    }

    async fn configure_device(&self, name: &str, update: PeerUpdate) -> Result<(), WireGuardError> {
        {
            let mut devices = self.devices.lock().map_err(|_| Self::lock_error())?;
            let device = devices
                .get_mut(name)
                .ok_or_else(|| WireGuardError::DeviceNotFound(name.to_string()))?;
            match device.peers.iter_mut().find(|p| p.public_key == update.public_key) {
                Some(peer) => peer.endpoint = Some(update.endpoint),
                None if update.update_only => {
                    return Err(WireGuardError::PeerNotFound {
                        device: name.to_string(),
                        peer: update.public_key.to_base64(),
                    });
                }
                None => device.peers.push(PeerInfo {
                    public_key: update.public_key,
                    endpoint: Some(update.endpoint),
                }),
            }
        }
        self.applied
            .lock()
            .map_err(|_| Self::lock_error())?
            .push((name.to_string(), update));
        Ok(())
    }
}
