//! Value types shared by the controllers.

pub mod device;
pub mod endpoint;
pub mod peer;
pub mod ping;

pub use device::{Device, DeviceProtocol};
pub use endpoint::EndpointData;
pub use peer::{Peer, PeerId, PeerProtocol};
pub use ping::{FailureOutcome, PeerPingConfig, PeerPingState, RetryPolicy};
