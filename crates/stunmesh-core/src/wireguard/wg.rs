//! [`WireGuardClient`] backed by the `wg` tool.

use std::net::SocketAddr;
use std::process::Stdio;

use async_trait::async_trait;
use stunmesh_crypto::{PrivateKey, PublicKey};
use tokio::process::Command;
use tracing::debug;

use super::{DeviceInfo, PeerInfo, PeerUpdate, WireGuardClient, WireGuardError};

/// Runs `wg show` / `wg set`.
#[derive(Debug, Clone)]
pub struct WgCli {
    program: String,
}

impl Default for WgCli {
    fn default() -> Self {
        Self::new()
    }
}

impl WgCli {
    /// Use `wg` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("wg")
    }

    /// Use a specific `wg` binary.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, WireGuardError> {
        debug!(program = %self.program, ?args, "running wg");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WireGuardError::Command(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WireGuardError::Command(format!(
                "{} {}: {}",
                self.program,
                args.join(" "),
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| WireGuardError::Parse(e.to_string()))
    }
}

// Unparseable endpoints (scoped link-local, for one) are dropped, the peer is kept.
fn parse_endpoint(field: &str) -> Option<SocketAddr> {
    if field == "(none)" {
        return None;
    }
    match field.parse() {
        Ok(endpoint) => Some(endpoint),
        Err(_) => {
            debug!(endpoint = %field, "ignoring unparseable peer endpoint");
            None
        }
    }
}

/// Parse `wg show <name> dump`.
///
/// The first line describes the interface
/// (`private-key public-key listen-port fwmark`), each following line one
/// peer (`public-key preshared-key endpoint allowed-ips ...`), tab separated.
pub fn parse_dump(name: &str, dump: &str) -> Result<DeviceInfo, WireGuardError> {
    let mut lines = dump.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| WireGuardError::Parse("empty dump".into()))?;
    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() < 3 {
        return Err(WireGuardError::Parse(format!("short interface line: {header:?}")));
    }

    let private_key = PrivateKey::from_base64(fields[0])
        .map_err(|e| WireGuardError::Parse(format!("private key: {e}")))?;
    let listen_port = fields[2]
        .parse()
        .map_err(|_| WireGuardError::Parse(format!("listen port {:?}", fields[2])))?;

    let mut peers = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(WireGuardError::Parse(format!("short peer line: {line:?}")));
        }
        let public_key = PublicKey::from_base64(fields[0])
            .map_err(|e| WireGuardError::Parse(format!("peer key: {e}")))?;
        peers.push(PeerInfo {
            public_key,
            endpoint: parse_endpoint(fields[2]),
        });
    }

    Ok(DeviceInfo {
        name: name.to_string(),
        listen_port,
        private_key,
        peers,
    })
}

#[async_trait]
impl WireGuardClient for WgCli {
    async fn devices(&self) -> Result<Vec<String>, WireGuardError> {
        let out = self.run(&["show", "interfaces"]).await?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    async fn device(&self, name: &str) -> Result<DeviceInfo, WireGuardError> {
        let out = self.run(&["show", name, "dump"]).await.map_err(|e| match e {
            WireGuardError::Command(detail) if detail.contains("No such device") => {
                WireGuardError::DeviceNotFound(name.to_string())
            }
            other => other,
        })?;
        parse_dump(name, &out)
    }

    async fn configure_device(&self, name: &str, update: PeerUpdate) -> Result<(), WireGuardError> {
        if update.update_only {
            let device = self.device(name).await?;
            if !device.has_peer(&update.public_key) {
                return Err(WireGuardError::PeerNotFound {
                    device: name.to_string(),
                    peer: update.public_key.to_base64(),
                });
            }
        }
        let key = update.public_key.to_base64();
        let endpoint = update.endpoint.to_string();
        self.run(&["set", name, "peer", &key, "endpoint", &endpoint])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &str = "d06b8RTc6G2fG9yxF+6k7mzXfvhxnJRYsy3/XvTSdXU=";
    const PEER_A: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";
    const PEER_B: &str = "AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=";

    fn dump() -> String {
        format!(
            "{PRIVATE}\tpubkey\t51820\toff\n\
             {PEER_A}\t(none)\t203.0.113.5:40000\t10.0.0.2/32\t1700000000\t100\t200\t25\n\
             {PEER_B}\t(none)\t(none)\t10.0.0.3/32\t0\t0\t0\toff\n"
        )
    }

    #[test]
    fn test_parse_dump() {
        let device = parse_dump("wg0", &dump()).unwrap();
        assert_eq!(device.name, "wg0");
        assert_eq!(device.listen_port, 51820);
        assert_eq!(device.private_key.as_bytes(), PrivateKey::from_base64(PRIVATE).unwrap().as_bytes());
        assert_eq!(device.peers.len(), 2);
        assert_eq!(device.peers[0].endpoint, Some("203.0.113.5:40000".parse().unwrap()));
        assert_eq!(device.peers[1].endpoint, None);
        assert!(device.has_peer(&PublicKey::from_bytes([2; 32])));
    }

    #[test]
    fn test_parse_ipv6_endpoint() {
        let text = format!("{PRIVATE}\tpub\t51820\toff\n{PEER_A}\t(none)\t[2001:db8::1]:51820\t::/0\t0\t0\t0\toff\n");
        let device = parse_dump("wg1", &text).unwrap();
        assert_eq!(device.peers[0].endpoint, Some("[2001:db8::1]:51820".parse().unwrap()));
    }

    #[test]
    fn test_parse_scoped_endpoint_keeps_peer() {
        let text = format!(
            "{PRIVATE}\tpub\t51820\toff\n\
             {PEER_A}\t(none)\t[fe80::1%eth0]:51820\tfe80::/64\t0\t0\t0\toff\n\
             {PEER_B}\t(none)\t198.51.100.7:51820\t10.0.0.3/32\t0\t0\t0\toff\n"
        );
        let device = parse_dump("wg0", &text).unwrap();
        assert_eq!(device.peers.len(), 2);
        assert_eq!(device.peers[0].endpoint, None);
        assert!(device.has_peer(&PublicKey::from_bytes([1; 32])));
        assert_eq!(device.peers[1].endpoint, Some("198.51.100.7:51820".parse().unwrap()));
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(matches!(parse_dump("wg0", ""), Err(WireGuardError::Parse(_))));
        assert!(matches!(parse_dump("wg0", "junk"), Err(WireGuardError::Parse(_))));
        let bad_port = format!("{PRIVATE}\tpub\tport\toff\n");
        assert!(matches!(parse_dump("wg0", &bad_port), Err(WireGuardError::Parse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_binary() {
        let client = WgCli::with_program("/nonexistent/wg");
        assert!(matches!(client.devices().await, Err(WireGuardError::Command(_))));
    }
}
