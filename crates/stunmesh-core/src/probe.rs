//! Peer reachability probes.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use stunmesh_transport::icmp;
use tracing::{debug, warn};

/// Answers whether a peer's tunnel address responds.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `target` once, waiting at most `timeout`.
    async fn probe(&self, target: &str, timeout: Duration) -> bool;
}

/// One ICMP echo per probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpProbe;

impl IcmpProbe {
    /// New probe.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

async fn resolve_target(target: &str) -> Option<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Some(ip);
    }
    match tokio::net::lookup_host((target, 0)).await {
        Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
        Err(e) => {
            debug!(target, error = %e, "ping target lookup failed");
            None
        }
    }
}

#[async_trait]
impl HealthProbe for IcmpProbe {
    async fn probe(&self, target: &str, timeout: Duration) -> bool {
        let Some(ip) = resolve_target(target).await else {
            return false;
        };
        match tokio::task::spawn_blocking(move || icmp::ping(ip, timeout)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(%ip, error = %e, "ping failed");
                false
            }
            Err(e) => {
                warn!(%ip, error = %e, "ping task failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal() {
        assert_eq!(resolve_target("10.0.0.2").await, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(resolve_target("fd00::2").await, Some("fd00::2".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_unresolvable_target_fails() {
        let probe = IcmpProbe::new();
        assert!(!probe.probe("host.invalid", Duration::from_millis(100)).await);
    }
}
