//! Per-client fixed-window rate limiting middleware.
//!
//! Clients are keyed by peer IP. Each key gets `max_requests` per window;
//! a background task drops windows that have already ended.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Key used when the peer address is unavailable.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug)]
struct ClientWindow {
    count: u32,
    window_ends: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

/// In-memory fixed-window limiter shared by all requests.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one request for `key`.
    pub async fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut clients = self.clients.lock().await;
        let window = clients
            .entry(key.to_string())
            .or_insert_with(|| ClientWindow {
                count: 0,
                window_ends: now + self.config.window,
            });

        if now >= window.window_ends {
            window.count = 0;
            window.window_ends = now + self.config.window;
        }

        if window.count >= self.config.max_requests {
            return Decision::Limited {
                retry_after: window.window_ends.saturating_duration_since(now),
            };
        }
        window.count += 1;
        Decision::Allowed
    }

    /// Drop windows that have ended. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now()).await
    }

    async fn evict_expired_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, w| w.window_ends > now);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Spawn a background task that periodically evicts stale client windows.
pub fn spawn_eviction_task(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.config.window);
        loop {
            interval.tick().await;
            let evicted = limiter.evict_expired().await;
            if evicted > 0 {
                debug!(evicted, "Evicted stale rate-limit windows");
            }
        }
    })
}

/// Axum middleware: reject with 429 once a client exhausts its window.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    match limiter.check(&key).await {
        Decision::Allowed => next.run(req).await,
        Decision::Limited { retry_after } => {
            let retry_after = retry_after.as_secs_f64().ceil() as u64;
            warn!(client = %key, retry_after, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Too Many Requests",
                    "retry_after": retry_after,
                })),
            )
                .into_response()
        }
    }
}
