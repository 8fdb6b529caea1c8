//! Ping health tracking.
//!
//! [`PeerPingState`] is a pure state machine: the monitor feeds it probe
//! results with the probe's sequence number and the current time, and it
//! answers whether a recovery (publish + establish) should fire now.
//!
//! ```text
//!             success                        failure
//!   ┌───────────────────────┐        ┌───────────────────────┐
//!   ▼                       │        │                       ▼
//! Healthy ──failure──▶ Unhealthy ──(retry due?)──▶ fire, schedule next
//!                           │
//!                           └── offset ≥ refresh interval ──▶ handed over
//!                               (no more retries until a success)
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// Delay after each of the first `fixed_retries` retries.
pub const FIXED_RETRY_DELAY: Duration = Duration::from_secs(5);

/// First delay once fixed retries are exhausted.
pub const BACKOFF_START: Duration = Duration::from_secs(10);

/// Increment per retry after that.
pub const BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Per-peer probing configuration.
///
/// A zero `interval` or `timeout` means "use the monitor default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerPingConfig {
    /// Probe this peer at all
    pub enabled: bool,
    /// Address (or host name) to send echo requests to
    pub target: String,
    /// Time between probes
    pub interval: Duration,
    /// Time to wait for a reply
    pub timeout: Duration,
}

impl PeerPingConfig {
    /// Interval, with zero replaced by `default`.
    #[must_use]
    pub fn interval_or(&self, default: Duration) -> Duration {
        if self.interval.is_zero() { default } else { self.interval }
    }

    /// Timeout, with zero replaced by `default`.
    #[must_use]
    pub fn timeout_or(&self, default: Duration) -> Duration {
        if self.timeout.is_zero() { default } else { self.timeout }
    }
}

/// Retry spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries spaced by [`FIXED_RETRY_DELAY`]
    pub fixed_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { fixed_retries: 3 }
    }
}

impl RetryPolicy {
    /// Delay before the retry following retry number `retry_count` (1-based).
    #[must_use]
    pub fn offset(&self, retry_count: u32) -> Duration {
        if retry_count <= self.fixed_retries {
            FIXED_RETRY_DELAY
        } else {
            BACKOFF_START.saturating_add(BACKOFF_STEP.saturating_mul(retry_count - self.fixed_retries - 1))
        }
    }
}

/// What a failed probe leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Result older than one already applied; state unchanged
    Stale,
    /// Recorded; next retry not due yet
    Waiting,
    /// Recorded; retries stopped until a probe succeeds
    HandedOver,
    /// Recorded; fire a recovery now
    Retry {
        /// Retry number just fired (1-based)
        attempt: u32,
        /// Delay to the next retry; `None` once handed over to refresh
        next_in: Option<Duration>,
    },
}

/// Mutable health record of one monitored peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPingState {
    /// Last applied probe succeeded
    pub is_healthy: bool,
    /// Consecutive failed probes
    pub failure_count: u32,
    /// Recoveries fired since the last success
    pub retry_count: u32,
    /// Last applied probe
    pub last_ping_time: Option<Instant>,
    /// Last recovery fired
    pub last_retry_time: Option<Instant>,
    /// Earliest time the next recovery may fire
    pub next_retry_time: Option<Instant>,
    /// Retries handed to the periodic refresh
    pub handed_over_to_refresh: bool,
    /// Current retry delay in units of [`FIXED_RETRY_DELAY`]
    pub backoff_multiplier: u32,
    /// Sequence number of the last applied probe
    pub last_sequence: u64,
}

impl Default for PeerPingState {
    fn default() -> Self {
        Self {
            is_healthy: true,
            failure_count: 0,
            retry_count: 0,
            last_ping_time: None,
            last_retry_time: None,
            next_retry_time: None,
            handed_over_to_refresh: false,
            backoff_multiplier: 1,
            last_sequence: 0,
        }
    }
}

impl PeerPingState {
    fn accept(&mut self, sequence: u64, now: Instant) -> bool {
        if sequence <= self.last_sequence {
            return false;
        }
        self.last_sequence = sequence;
        self.last_ping_time = Some(now);
        true
    }

    /// Apply a successful probe. Returns `false` if the result was stale.
    pub fn record_success(&mut self, sequence: u64, now: Instant) -> bool {
        if !self.accept(sequence, now) {
            return false;
        }
        self.is_healthy = true;
        self.failure_count = 0;
        self.retry_count = 0;
        self.backoff_multiplier = 1;
        self.handed_over_to_refresh = false;
        self.next_retry_time = None;
        true
    }

    /// Whether a recovery may fire at `now`.
    #[must_use]
    pub fn should_retry(&self, now: Instant) -> bool {
        if self.retry_count == 0 {
            return true;
        }
        if self.handed_over_to_refresh {
            return false;
        }
        self.next_retry_time.is_none_or(|due| now >= due)
    }

    /// Apply a failed probe and decide whether to fire a recovery.
    ///
    /// `refresh_interval` is read at failure time: once the next retry would
    /// be at least that far away, the periodic refresh covers the peer.
    pub fn record_failure(
        &mut self,
        sequence: u64,
        now: Instant,
        policy: &RetryPolicy,
        refresh_interval: Duration,
    ) -> FailureOutcome {
        if !self.accept(sequence, now) {
            return FailureOutcome::Stale;
        }
        self.failure_count += 1;
        self.is_healthy = false;

        if !self.should_retry(now) {
            return if self.handed_over_to_refresh {
                FailureOutcome::HandedOver
            } else {
                FailureOutcome::Waiting
            };
        }

        self.retry_count += 1;
        self.last_retry_time = Some(now);
        let offset = policy.offset(self.retry_count);
        self.backoff_multiplier = (offset.as_secs() / FIXED_RETRY_DELAY.as_secs()) as u32;

        let next_in = if offset >= refresh_interval {
            self.handed_over_to_refresh = true;
            self.next_retry_time = None;
            None
        } else {
            self.next_retry_time = Some(now + offset);
            Some(offset)
        };

        FailureOutcome::Retry {
            attempt: self.retry_count,
            next_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFRESH: Duration = Duration::from_secs(600);

    #[test]
    fn test_retry_offsets() {
        let policy = RetryPolicy::default();
        let offsets: Vec<u64> = (1..=6).map(|n| policy.offset(n).as_secs()).collect();
        assert_eq!(offsets, vec![5, 5, 5, 10, 15, 20]);
    }

    #[test]
    fn test_ping_config_defaults() {
        let config = PeerPingConfig {
            enabled: true,
            target: "10.0.0.2".into(),
            interval: Duration::ZERO,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(config.interval_or(Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(config.timeout_or(Duration::from_secs(5)), Duration::from_secs(2));
    }

    #[test]
    fn test_first_failure_retries_immediately() {
        let mut state = PeerPingState::default();
        let now = Instant::now();

        let outcome = state.record_failure(1, now, &RetryPolicy::default(), REFRESH);
        assert_eq!(
            outcome,
            FailureOutcome::Retry { attempt: 1, next_in: Some(FIXED_RETRY_DELAY) }
        );
        assert!(!state.is_healthy);
        assert_eq!(state.failure_count, 1);
        assert_eq!(state.next_retry_time, Some(now + FIXED_RETRY_DELAY));
    }

    #[test]
    fn test_failures_before_due_wait() {
        let mut state = PeerPingState::default();
        let start = Instant::now();
        let policy = RetryPolicy::default();

        state.record_failure(1, start, &policy, REFRESH);
        let outcome = state.record_failure(2, start + Duration::from_secs(1), &policy, REFRESH);
        assert_eq!(outcome, FailureOutcome::Waiting);
        assert_eq!(state.failure_count, 2);
        assert_eq!(state.retry_count, 1);

        let outcome = state.record_failure(3, start + Duration::from_secs(5), &policy, REFRESH);
        assert!(matches!(outcome, FailureOutcome::Retry { attempt: 2, .. }));
    }

    #[test]
    fn test_schedule_with_fixed_retries() {
        let mut state = PeerPingState::default();
        let policy = RetryPolicy { fixed_retries: 3 };
        let mut now = Instant::now();
        let mut offsets = Vec::new();

        for sequence in 1..=6 {
            match state.record_failure(sequence, now, &policy, REFRESH) {
                FailureOutcome::Retry { next_in: Some(offset), .. } => {
                    offsets.push(offset.as_secs());
                    now += offset;
                }
                other => panic!("expected a retry, got {other:?}"),
            }
        }
        assert_eq!(offsets, vec![5, 5, 5, 10, 15, 20]);
        assert_eq!(state.backoff_multiplier, 4);
    }

    #[test]
    fn test_handover_stops_retries_until_success() {
        let refresh = Duration::from_secs(15);
        let policy = RetryPolicy::default();
        let mut state = PeerPingState::default();
        let mut now = Instant::now();
        let mut fired = 0;

        for sequence in 1..=40 {
            match state.record_failure(sequence, now, &policy, refresh) {
                FailureOutcome::Retry { .. } => fired += 1,
                FailureOutcome::Waiting | FailureOutcome::HandedOver => {}
                FailureOutcome::Stale => panic!("sequence is monotonic"),
            }
            now += Duration::from_secs(1);
        }
        // 5, 5, 5, 10 keep retrying; the fifth retry's 15 s offset hands over.
        assert_eq!(fired, 5);
        assert!(state.handed_over_to_refresh);
        assert_eq!(state.next_retry_time, None);
        assert!(!state.should_retry(now + Duration::from_secs(3600)));

        assert!(state.record_success(41, now));
        assert!(state.is_healthy);
        assert_eq!((state.failure_count, state.retry_count, state.backoff_multiplier), (0, 0, 1));
        assert!(!state.handed_over_to_refresh);

        let outcome = state.record_failure(42, now, &policy, refresh);
        assert!(matches!(outcome, FailureOutcome::Retry { attempt: 1, .. }));
    }

    #[test]
    fn test_stale_results_dropped() {
        let mut state = PeerPingState::default();
        let now = Instant::now();

        state.record_failure(5, now, &RetryPolicy::default(), REFRESH);
        assert!(!state.record_success(4, now));
        assert!(!state.is_healthy);
        assert_eq!(
            state.record_failure(3, now, &RetryPolicy::default(), REFRESH),
            FailureOutcome::Stale
        );
        assert_eq!(state.failure_count, 1);
    }

    #[test]
    fn test_immediate_handover_when_refresh_is_short() {
        let mut state = PeerPingState::default();
        let outcome = state.record_failure(1, Instant::now(), &RetryPolicy::default(), Duration::from_secs(5));
        assert_eq!(outcome, FailureOutcome::Retry { attempt: 1, next_in: None });
        assert!(state.handed_over_to_refresh);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn offsets_never_shrink(fixed in 0u32..10, n in 1u32..1000) {
                let policy = RetryPolicy { fixed_retries: fixed };
                prop_assert!(policy.offset(n + 1) >= policy.offset(n));
                prop_assert!(policy.offset(n) >= FIXED_RETRY_DELAY);
            }

            #[test]
            fn failures_always_reach_handover(refresh_secs in 1u64..3600) {
                let policy = RetryPolicy::default();
                let refresh = Duration::from_secs(refresh_secs);
                let mut state = PeerPingState::default();
                let mut now = Instant::now();

                for sequence in 1..=2000u64 {
                    if let FailureOutcome::Retry { next_in: Some(delay), .. } =
                        state.record_failure(sequence, now, &policy, refresh)
                    {
                        prop_assert!(delay < refresh);
                    }
                    if state.handed_over_to_refresh {
                        break;
                    }
                    now = state.next_retry_time.unwrap_or(now);
                }
                prop_assert!(state.handed_over_to_refresh);
            }
        }
    }
}
