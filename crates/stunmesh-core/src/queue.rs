//! Establish work queue.
//!
//! Refresh sweeps and explicit triggers enqueue peers; the establish worker
//! drains them one at a time. A peer already waiting in the queue is not
//! queued twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::trace;

use crate::entity::PeerId;

/// Producer half, cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<PeerId>,
    pending: Arc<Mutex<HashSet<PeerId>>>,
}

/// Consumer half, owned by the establish worker.
#[derive(Debug)]
pub struct WorkReceiver {
    rx: mpsc::UnboundedReceiver<PeerId>,
    pending: Arc<Mutex<HashSet<PeerId>>>,
}

/// Create a connected queue.
#[must_use]
pub fn work_queue() -> (WorkQueue, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(Mutex::new(HashSet::new()));
    (
        WorkQueue {
            tx,
            pending: Arc::clone(&pending),
        },
        WorkReceiver { rx, pending },
    )
}

impl WorkQueue {
    /// Queue `peer`. Returns `false` if it was already waiting or the worker
    /// is gone.
    pub fn push(&self, peer: PeerId) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        if !pending.insert(peer) {
            trace!(%peer, "already queued");
            return false;
        }
        if self.tx.send(peer).is_err() {
            pending.remove(&peer);
            return false;
        }
        true
    }
}

impl WorkReceiver {
    /// Next queued peer; `None` once every producer is dropped.
    pub async fn recv(&mut self) -> Option<PeerId> {
        let peer = self.rx.recv().await?;
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&peer);
        }
        Some(peer)
    }
}
