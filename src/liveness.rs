//! Presence and latency bookkeeping for the storyteller.
//!
//! Every participant pings once per interval. A participant that has not
//! been heard from for more than two intervals is considered gone.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Latency samples at or above this many milliseconds are discarded.
pub const MAX_LATENCY_MS: u64 = 30_000;

/// Default heartbeat interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Last-seen times and latency samples per participant identity.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    ping_interval: Duration,
    last_seen: HashMap<String, Instant>,
    latencies: HashMap<String, u64>,
}

impl LivenessTracker {
    pub fn new(ping_interval: Duration) -> Self {
        Self {
            ping_interval,
            last_seen: HashMap::new(),
            latencies: HashMap::new(),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Mark `identity` as present at `now`.
    pub fn touch(&mut self, identity: &str, now: Instant) {
        self.last_seen.insert(identity.to_owned(), now);
    }

    /// Store a latency sample for `identity`. Returns `false` if the sample
    /// was out of range and ignored.
    pub fn record_latency(&mut self, identity: &str, latency_ms: u64) -> bool {
        if latency_ms == 0 || latency_ms >= MAX_LATENCY_MS {
            return false;
        }
        self.latencies.insert(identity.to_owned(), latency_ms);
        true
    }

    /// Drop everyone not seen within two intervals of `now` and return who
    /// was dropped.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let horizon = self.ping_interval * 2;
        let mut evicted: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > horizon)
            .map(|(identity, _)| identity.clone())
            .collect();
        evicted.sort();
        for identity in &evicted {
            self.remove(identity);
        }
        evicted
    }

    pub fn remove(&mut self, identity: &str) {
        self.last_seen.remove(identity);
        self.latencies.remove(identity);
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.last_seen.contains_key(identity)
    }

    /// Number of live participants.
    pub fn count(&self) -> usize {
        self.last_seen.len()
    }

    /// Rounded mean of the stored latency samples, if there are any.
    pub fn aggregate_ping(&self) -> Option<u64> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: u64 = self.latencies.values().sum();
        let count = self.latencies.len() as u64;
        Some((total + count / 2) / count)
    }

    pub fn reset(&mut self) {
        self.last_seen.clear();
        self.latencies.clear();
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PING_INTERVAL)
    }
}
