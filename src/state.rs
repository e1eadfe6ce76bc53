//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::Config;
use crate::ratelimit::RateLimiter;
use crate::ssh::{SessionFactory, ShellConnector};

/// Shared application state for the provisioning server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Per-client token buckets, shared with the sweeper task.
    pub limiter: RateLimiter,
    /// Opens shell sessions to routers.
    pub connector: Arc<dyn ShellConnector>,
    /// Request and connection counters reported by `/health`.
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// State wired to real SSH sessions.
    pub fn new(config: Config) -> Self {
        let connector = Arc::new(SessionFactory::from_config(&config.ssh));
        Self::with_connector(config, connector)
    }

    /// State with a custom connector (tests, alternative transports).
    pub fn with_connector(config: Config, connector: Arc<dyn ShellConnector>) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            limiter: RateLimiter::new(),
            connector,
            metrics: Arc::new(Metrics::default()),
        }
    }
}

/// Service counters reported by `/health`.
#[derive(Debug, Default)]
pub struct Metrics {
    pub total_requests: AtomicU64,
    pub active_connections: AtomicU64,
    pub provisions_succeeded: AtomicU64,
    pub provisions_failed: AtomicU64,
    pub rate_limited: AtomicU64,
    pub auth_rejected: AtomicU64,
}

/// Point-in-time copy of [`Metrics`] for serialization.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_requests: u64,
    pub provisions_succeeded: u64,
    pub provisions_failed: u64,
    pub rate_limited: u64,
    pub auth_rejected: u64,
}

impl Metrics {
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_rejected(&self) {
        self.auth_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provision(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.provisions_succeeded
        } else {
            &self.provisions_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Never wraps below zero
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            provisions_succeeded: self.provisions_succeeded.load(Ordering::Relaxed),
            provisions_failed: self.provisions_failed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            auth_rejected: self.auth_rejected.load(Ordering::Relaxed),
        }
    }
}
