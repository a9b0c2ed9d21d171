//! Relay counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the relay loop and consumer lifecycles
#[derive(Debug, Default)]
pub struct RelayStats {
    producer_sessions: AtomicU64,
    producer_disconnects: AtomicU64,
    producer_rejections: AtomicU64,
    frames_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
    frames_dropped: AtomicU64,
    consumers_connected: AtomicU64,
    consumers_evicted: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Producer connections served
    pub producer_sessions: u64,
    /// Producer connections that ended on a stream failure
    pub producer_disconnects: u64,
    /// Producer connections dropped for a structurally invalid frame
    pub producer_rejections: u64,
    /// Frames handed to the broadcaster
    pub frames_relayed: u64,
    /// Wire bytes of relayed frames
    pub bytes_relayed: u64,
    /// Sensitive frames dropped on checksum mismatch
    pub frames_dropped: u64,
    /// Consumer connections registered
    pub consumers_connected: u64,
    /// Consumers removed after a failed write
    pub consumers_evicted: u64,
}

impl RelayStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_producer_session(&self) {
        self.producer_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_producer_disconnect(&self) {
        self.producer_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_producer_rejection(&self) {
        self.producer_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_relayed(&self, bytes: usize, evicted: usize) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed.fetch_add(bytes as u64, Ordering::Relaxed);
        self.consumers_evicted
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumer_connected(&self) {
        self.consumers_connected.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            producer_sessions: self.producer_sessions.load(Ordering::Relaxed),
            producer_disconnects: self.producer_disconnects.load(Ordering::Relaxed),
            producer_rejections: self.producer_rejections.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            consumers_connected: self.consumers_connected.load(Ordering::Relaxed),
            consumers_evicted: self.consumers_evicted.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for RelayStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames_relayed={} bytes_relayed={} frames_dropped={} producer_sessions={} \
             producer_disconnects={} producer_rejections={} consumers_connected={} consumers_evicted={}",
            self.frames_relayed,
            self.bytes_relayed,
            self.frames_dropped,
            self.producer_sessions,
            self.producer_disconnects,
            self.producer_rejections,
            self.consumers_connected,
            self.consumers_evicted
        )
    }
}
