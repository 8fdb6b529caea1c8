//! Per-peer reachability monitoring with retry/backoff recovery.
//!
//! Every monitored peer owns one ticker loop. Each tick spawns a short task
//! that probes the peer and feeds the result, tagged with a sequence number
//! taken at tick time, into the peer's [`PeerPingState`]. Results that
//! arrive after a newer one has been applied are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{EstablishController, PublishController};
use crate::config::MonitorConfig;
use crate::entity::{FailureOutcome, Peer, PeerId, PeerPingState};
use crate::probe::HealthProbe;
use crate::shutdown::ShutdownSignal;

struct Inner {
    probe: Arc<dyn HealthProbe>,
    publish: PublishController,
    establish: EstablishController,
    config: MonitorConfig,
    states: RwLock<HashMap<PeerId, Arc<Mutex<PeerPingState>>>>,
    sequence: AtomicU64,
    shutdown: ShutdownSignal,
}

/// Probes peers and fires publish + establish when one stops answering.
#[derive(Clone)]
pub struct PingMonitorController {
    inner: Arc<Inner>,
}

impl PingMonitorController {
    /// New monitor; loops stop when `shutdown` fires.
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        publish: PublishController,
        establish: EstablishController,
        config: MonitorConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                probe,
                publish,
                establish,
                config,
                states: RwLock::new(HashMap::new()),
                sequence: AtomicU64::new(0),
                shutdown,
            }),
        }
    }

    /// Start monitoring `peer`.
    ///
    /// Returns `None` if probing is disabled for it, it has no target, its
    /// interval resolves to zero, or it is already monitored.
    pub async fn add_peer(&self, peer: &Peer) -> Option<JoinHandle<()>> {
        if !peer.ping.enabled || peer.ping.target.trim().is_empty() {
            return None;
        }
        let interval = peer.ping.interval_or(self.inner.config.default_interval);
        if interval.is_zero() {
            warn!(peer = %peer.id, "ping interval is zero, not monitoring");
            return None;
        }
        {
            let mut states = self.inner.states.write().await;
            if states.contains_key(&peer.id) {
                return None;
            }
            states.insert(peer.id, Arc::new(Mutex::new(PeerPingState::default())));
        }

        let id = peer.id;
        let target = peer.ping.target.clone();
        let timeout = peer.ping.timeout_or(self.inner.config.default_timeout);
        info!(peer = %id, %target, ?interval, ?timeout, "ping monitor started");

        let monitor = self.clone();
        let mut shutdown = self.inner.shutdown.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let sequence = monitor.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                        let monitor = monitor.clone();
                        let target = target.clone();
                        tokio::spawn(async move {
                            monitor.check(id, &target, timeout, sequence).await;
                        });
                    }
                }
            }
            debug!(peer = %id, "ping monitor stopped");
        }))
    }

    async fn check(&self, id: PeerId, target: &str, timeout: Duration, sequence: u64) {
        let reachable = tokio::time::timeout(timeout, self.inner.probe.probe(target, timeout))
            .await
            .unwrap_or(false);

        let Some(state) = self.inner.states.read().await.get(&id).cloned() else {
            return;
        };
        let mut state = state.lock().await;
        let now = Instant::now();

        if reachable {
            let was_healthy = state.is_healthy;
            if state.record_success(sequence, now) && !was_healthy {
                info!(peer = %id, "peer reachable again");
            }
            return;
        }

        let outcome = state.record_failure(
            sequence,
            now,
            &self.inner.config.retry,
            self.inner.config.refresh_interval,
        );
        let failures = state.failure_count;
        drop(state);

        match outcome {
            FailureOutcome::Retry { attempt, next_in } => {
                warn!(peer = %id, failures, attempt, ?next_in, "peer unreachable, republishing");
                self.recover(id);
            }
            FailureOutcome::HandedOver => {
                debug!(peer = %id, failures, "peer unreachable, left to periodic refresh");
            }
            FailureOutcome::Waiting => debug!(peer = %id, failures, "peer unreachable, retry pending"),
            FailureOutcome::Stale => trace!(peer = %id, sequence, "stale probe result dropped"),
        }
    }

    /// Publish then establish for `id`, neither awaited.
    fn recover(&self, id: PeerId) {
        let publish = self.inner.publish.clone();
        tokio::spawn(async move {
            if let Err(e) = publish.execute_for_peer(&id).await {
                warn!(peer = %id, error = %e, "recovery publish failed");
            }
        });
        let establish = self.inner.establish.clone();
        tokio::spawn(async move {
            if let Err(e) = establish.execute(&id).await {
                warn!(peer = %id, error = %e, "recovery establish failed");
            }
        });
    }

    /// `(healthy, consecutive failures)`; unmonitored peers are healthy.
    pub async fn peer_state(&self, id: &PeerId) -> (bool, u32) {
        match self.snapshot(id).await {
            Some(state) => (state.is_healthy, state.failure_count),
            None => (true, 0),
        }
    }

    /// Copy of the full state of `id`.
    pub async fn snapshot(&self, id: &PeerId) -> Option<PeerPingState> {
        let state = self.inner.states.read().await.get(id).cloned()?;
        let state = state.lock().await;
        Some(state.clone())
    }
}
