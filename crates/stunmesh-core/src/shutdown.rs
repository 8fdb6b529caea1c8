//! Process-wide shutdown signal.

use tokio::sync::watch;

/// Trigger side, held by the daemon.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Listener side, cloned into every long-running loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// New, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Listener for loops to select on.
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Tell every listener to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or the trigger is dropped.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_wakes_listeners() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = a.clone();
        assert!(!a.is_shutdown());

        let waiter = tokio::spawn(async move { b.recv().await });
        shutdown.trigger();
        a.recv().await;
        waiter.await.unwrap();
        assert!(a.is_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_listeners() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);
        signal.recv().await;
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.subscribe().is_shutdown());
    }
}
