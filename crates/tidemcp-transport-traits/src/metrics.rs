//! Transport metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a transport's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Requests accepted into the inbound queue.
    pub requests_received: u64,

    /// Inbound messages refused because the inbound queue was full.
    pub requests_rejected: u64,

    /// Synthetic error responses produced for malformed or invalid input.
    pub protocol_errors: u64,

    /// Responses handed to the wire or to a session queue.
    pub responses_sent: u64,

    /// Responses dropped because a session queue was full.
    pub responses_dropped: u64,

    /// Total bytes of accepted inbound messages.
    pub bytes_received: u64,

    /// Total bytes of encoded outbound responses.
    pub bytes_sent: u64,

    /// Currently registered sessions (session-multiplexed transports only).
    pub active_sessions: u64,
}

/// A lock-free, atomic structure for metrics updates from many tasks.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Requests accepted into the inbound queue.
    pub requests_received: AtomicU64,

    /// Inbound messages refused because the queue was full.
    pub requests_rejected: AtomicU64,

    /// Synthetic error responses produced.
    pub protocol_errors: AtomicU64,

    /// Responses delivered.
    pub responses_sent: AtomicU64,

    /// Responses dropped on a full session queue.
    pub responses_dropped: AtomicU64,

    /// Inbound bytes.
    pub bytes_received: AtomicU64,

    /// Outbound bytes.
    pub bytes_sent: AtomicU64,

    /// Registered sessions.
    pub active_sessions: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request accepted into the inbound queue.
    pub fn record_request(&self, size: usize) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Records one response delivered.
    pub fn record_response(&self, size: usize) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Increments a plain counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements a gauge, saturating at zero.
    pub fn decr(counter: &AtomicU64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    /// Creates a serializable `TransportMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            responses_dropped: self.responses_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }
}
