//! # stunmesh Discovery
//!
//! Public endpoint discovery for stunmesh.
//!
//! This crate provides:
//! - A minimal RFC 5389 STUN codec (Binding only)
//! - [`StunSession`]: one Binding transaction sent from an arbitrary local
//!   port over a raw socket, with the reply picked up by a packet capture
//! - [`StunResolver`]: the async seam the daemon resolves endpoints through
//!
//! ## Example
//!
//! ```rust,no_run
//! use stunmesh_discovery::{RawStunResolver, StunResolver};
//! use stunmesh_transport::AddressFamily;
//!
//! # async fn run() -> Result<(), stunmesh_discovery::DiscoveryError> {
//! let resolver = RawStunResolver::new("stun.l.google.com:19302");
//! let public = resolver.resolve("wg0", 51820, AddressFamily::V4).await?;
//! println!("wg0 is reachable at {public}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod resolver;
pub mod session;
pub mod stun;

pub use error::DiscoveryError;
pub use resolver::{RawStunResolver, StunResolver};
pub use session::StunSession;
pub use stun::{StunAttribute, StunError, StunMessage, StunMessageClass};
