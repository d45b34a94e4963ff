use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Snapshot of server counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Connections returned by accept()
    pub accepted: u64,
    /// Connections that got a slot
    pub admitted: u64,
    /// Connections dropped because the gate was full
    pub rejected: u64,
    /// Connections dropped by the accept rate limiter
    pub rate_limited: u64,
    /// Workers that finished
    pub completed: u64,
    pub responses_2xx: u64,
    pub responses_3xx: u64,
    pub responses_4xx: u64,
    pub responses_5xx: u64,
    /// Connections closed without any response bytes written by us
    pub silent_closes: u64,
    /// Unix timestamp when the server started
    pub start_time: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    rate_limited: AtomicU64,
    completed: AtomicU64,
    responses_2xx: AtomicU64,
    responses_3xx: AtomicU64,
    responses_4xx: AtomicU64,
    responses_5xx: AtomicU64,
    silent_closes: AtomicU64,
}

/// Server statistics tracker, cheap to clone
#[derive(Debug, Clone)]
pub struct ServerStats {
    counters: Arc<Counters>,
    start_time: u64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            start_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn record_accepted(&self) {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished worker; `None` means the connection was closed silently
    pub fn record_completed(&self, status: Option<StatusCode>) {
        let counters = &self.counters;
        counters.completed.fetch_add(1, Ordering::Relaxed);

        let counter = match status {
            Some(s) if s.is_success() => &counters.responses_2xx,
            Some(s) if s.is_redirection() => &counters.responses_3xx,
            Some(s) if s.is_client_error() => &counters.responses_4xx,
            Some(s) if s.is_server_error() => &counters.responses_5xx,
            Some(_) => return,
            None => &counters.silent_closes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of stats
    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            accepted: c.accepted.load(Ordering::Relaxed),
            admitted: c.admitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            rate_limited: c.rate_limited.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            responses_2xx: c.responses_2xx.load(Ordering::Relaxed),
            responses_3xx: c.responses_3xx.load(Ordering::Relaxed),
            responses_4xx: c.responses_4xx.load(Ordering::Relaxed),
            responses_5xx: c.responses_5xx.load(Ordering::Relaxed),
            silent_closes: c.silent_closes.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }

    /// Snapshot as a JSON string
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}
