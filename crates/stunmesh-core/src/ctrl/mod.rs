//! Controllers driving the publish / establish cycle.
//!
//! ```text
//!  bootstrap ──▶ Devices, Peers
//!                   │
//!   refresh timer ──┼──▶ publish  ──▶ store.set(local key, envelope)
//!                   └──▶ refresh  ──▶ work queue ──▶ establish worker
//!                                                     │
//!              store.get(remote key) ◀────────────────┘──▶ wg set endpoint
//!
//!  ping monitor ── failure ──▶ publish(peer) + establish(peer)
//! ```

mod bootstrap;
mod establish;
mod ping_monitor;
mod publish;
mod refresh;

pub use bootstrap::BootstrapController;
pub use establish::EstablishController;
pub use ping_monitor::PingMonitorController;
pub use publish::PublishController;
pub use refresh::RefreshController;
