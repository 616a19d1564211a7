//! Relay metrics for observability
//!
//! Counters are bumped from the gateway, the relay and the WebSocket tasks,
//! and exposed as a snapshot on `/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,
    /// Connections closed by the heartbeat
    pub heartbeat_timeouts: AtomicU64,

    // Session metrics
    pub sessions_created: AtomicU64,
    pub sessions_ended: AtomicU64,
    pub remotes_joined: AtomicU64,
    /// join-remote calls for unknown sessions
    pub joins_rejected: AtomicU64,

    // Message metrics
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    /// Sends to dead or saturated connections
    pub messages_dropped: AtomicU64,
    /// Frames that failed to decode
    pub messages_malformed: AtomicU64,
    /// Commands/updates from senders without the required role
    pub messages_unauthorized: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_joined(&self) {
        self.remotes_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn join_rejected(&self) {
        self.joins_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_unauthorized(&self) {
        self.messages_unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                created: self.sessions_created.load(Ordering::Relaxed),
                ended: self.sessions_ended.load(Ordering::Relaxed),
                remotes_joined: self.remotes_joined.load(Ordering::Relaxed),
                joins_rejected: self.joins_rejected.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
                malformed: self.messages_malformed.load(Ordering::Relaxed),
                unauthorized: self.messages_unauthorized.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub sessions: SessionMetrics,
    pub messages: MessageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub heartbeat_timeouts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub created: u64,
    pub ended: u64,
    pub remotes_joined: u64,
    pub joins_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub unauthorized: u64,
}
