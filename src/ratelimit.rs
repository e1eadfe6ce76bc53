//! Per-client token bucket rate limiting.
//!
//! [`RateLimiter`] keeps one bucket per client identity (normally the peer IP).
//! A new identity starts with `max_requests - 1` tokens. Tokens refill
//! linearly with elapsed time, and a bucket untouched for a whole window is
//! reset to full. The refill is approximate: `last_refill` only advances when
//! at least one whole token was added.
//!
//! ## Concurrency
//!
//! The bucket map is behind an `RwLock`. [`RateLimiter::allow`] and the sweep
//! take the write lock; [`RateLimiter::bucket`] and [`RateLimiter::len`] take
//! the read lock. The sweep runs as a periodic task started by
//! [`RateLimiter::spawn_sweeper`] and stopped through a `CancellationToken`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Identity used when neither the peer address nor a forwarded header is known.
const UNKNOWN_CLIENT: &str = "unknown";

/// Token state for one client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientBucket {
    /// Remaining tokens, always within `0..=max_requests`.
    pub tokens: u32,
    pub last_refill: Instant,
}

/// Shared per-client limiter.
///
/// Cloneable — all clones share the same inner `Arc<RwLock<...>>`.
#[derive(Clone, Default)]
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, ClientBucket>>>,
}

/// Whole tokens earned after `elapsed` out of `window` at `max_requests` per window.
///
/// Monotonic in `elapsed`. Callers guarantee `elapsed < window` and a
/// non-zero window.
pub fn tokens_to_add(max_requests: u32, elapsed: Duration, window: Duration) -> u32 {
    let earned = u128::from(max_requests) * elapsed.as_nanos() / window.as_nanos();
    u32::try_from(earned).unwrap_or(u32::MAX)
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admission check for one request from `identity`.
    pub async fn allow(&self, identity: &str, max_requests: u32, window: Duration) -> bool {
        self.allow_at(identity, max_requests, window, Instant::now())
            .await
    }

    /// [`allow`](Self::allow) against an explicit clock reading.
    pub async fn allow_at(
        &self,
        identity: &str,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> bool {
        if window.is_zero() {
            return true;
        }
        if max_requests == 0 {
            return false;
        }

        let mut buckets = self.buckets.write().await;
        let Some(bucket) = buckets.get_mut(identity) else {
            buckets.insert(
                identity.to_string(),
                ClientBucket {
                    tokens: max_requests - 1,
                    last_refill: now,
                },
            );
            return true;
        };

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed >= window {
            bucket.tokens = max_requests - 1;
            bucket.last_refill = now;
            return true;
        }

        let earned = tokens_to_add(max_requests, elapsed, window);
        if earned > 0 {
            bucket.tokens = bucket.tokens.saturating_add(earned).min(max_requests);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Snapshot of one client's bucket.
    pub async fn bucket(&self, identity: &str) -> Option<ClientBucket> {
        self.buckets.read().await.get(identity).copied()
    }

    /// Number of tracked clients.
    pub async fn len(&self) -> usize {
        self.buckets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buckets.read().await.is_empty()
    }

    /// Drop buckets idle for longer than `retention`. Returns how many were removed.
    pub async fn sweep(&self, retention: Duration) -> usize {
        self.sweep_at(retention, Instant::now()).await
    }

    /// [`sweep`](Self::sweep) against an explicit clock reading.
    pub async fn sweep_at(&self, retention: Duration, now: Instant) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) <= retention);
        before - buckets.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    ///
    /// The first sweep happens one full interval after start.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        retention: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("Rate limit sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.sweep(retention).await;
                        if removed > 0 {
                            debug!("Rate limit sweep dropped {removed} idle client(s)");
                        }
                    }
                }
            }
        })
    }
}

/// Resolve the identity a request is rate limited under.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` hop (or
/// `X-Real-IP`) wins over the socket peer address.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded.or(real_ip) {
            return ip.to_string();
        }
    }
    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

/// Axum middleware applying the limiter configured in [`AppState`].
///
/// Rejects with `429 Too Many Requests` and a `Retry-After` of one window.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let cfg = &state.config.rate_limit;
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer, cfg.trust_forwarded_for);

    if !state
        .limiter
        .allow(&identity, cfg.max_requests, cfg.window())
        .await
    {
        warn!(
            ip = %identity,
            method = %request.method(),
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        state.metrics.record_rate_limited();
        return ApiError::RateLimited {
            retry_after_secs: cfg.window_secs,
        }
        .into_response();
    }

    next.run(request).await
}
