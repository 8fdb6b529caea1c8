use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::PublishController;
use crate::queue::WorkQueue;
use crate::repo::Peers;
use crate::shutdown::ShutdownSignal;

/// Periodically re-queues every peer for the establish worker.
#[derive(Clone)]
pub struct RefreshController {
    peers: Arc<Peers>,
    queue: WorkQueue,
}

impl RefreshController {
    /// New controller feeding `queue`.
    pub fn new(peers: Arc<Peers>, queue: WorkQueue) -> Self {
        Self { peers, queue }
    }

    /// Queue every peer. Returns how many were newly queued.
    pub async fn execute(&self) -> usize {
        let mut queued = 0;
        for peer in self.peers.list().await {
            if self.queue.push(peer.id) {
                queued += 1;
            }
        }
        debug!(queued, "refresh queued peers");
        queued
    }

    /// Every `interval`, publish then refresh, until shutdown.
    ///
    /// The first round runs one full interval after the call.
    pub fn run(
        &self,
        publish: PublishController,
        interval: Duration,
        mut shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        let ctrl = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        info!("refreshing endpoints");
                        publish.execute().await;
                        ctrl.execute().await;
                    }
                }
            }
            debug!("refresh loop stopped");
        })
    }
}
