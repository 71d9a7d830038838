use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub count: u32,
    pub reset_at: i64,
}

/// Backing storage for fixed rate-limit windows. The in-memory map is the
/// only implementation here; a shared cache can stand in for multi-instance
/// deployments.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Counts one hit against `key` and returns the window after the hit.
    async fn hit(&self, key: &str, now: i64, window_secs: i64) -> WindowEntry;

    /// Drops windows that ended before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: i64) -> usize;
}

#[derive(Clone, Default)]
pub struct InMemoryWindows {
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

#[async_trait]
impl WindowStore for InMemoryWindows {
    async fn hit(&self, key: &str, now: i64, window_secs: i64) -> WindowEntry {
        let mut windows = self.windows.lock().await;

        let entry = windows.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now.saturating_add(window_secs),
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now.saturating_add(window_secs);
        }

        entry.count = entry.count.saturating_add(1);
        *entry
    }

    async fn purge_expired(&self, now: i64) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, entry| now < entry.reset_at);
        before - windows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: i64,
}

impl RateDecision {
    pub fn reset_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset_at, 0).unwrap_or_else(Utc::now)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    max_requests: u32,
    window_secs: i64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self::with_store(Arc::new(InMemoryWindows::default()), max_requests, window_secs)
    }

    pub fn with_store(store: Arc<dyn WindowStore>, max_requests: u32, window_secs: u64) -> Self {
        Self {
            store,
            max_requests,
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX / 2),
        }
    }

    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Utc::now().timestamp()).await
    }

    pub async fn check_at(&self, key: &str, now: i64) -> RateDecision {
        let entry = self.store.hit(key, now, self.window_secs).await;
        RateDecision {
            allowed: entry.count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }

    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired(Utc::now().timestamp()).await
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Client IP from the socket, then proxy headers.
pub fn client_ip(peer: Option<SocketAddr>, headers: &HeaderMap) -> String {
    peer.map(|addr| addr.ip().to_string())
        .or_else(|| forwarded_ip(headers))
        .unwrap_or_else(|| "unknown".to_string())
}

fn get_client_key(req: &Request) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    format!("ip:{}", client_ip(peer, req.headers()))
}

/// Periodically drops finished windows so idle clients do not accumulate.
pub fn spawn_purge_task(limiters: Vec<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for limiter in &limiters {
                let purged = limiter.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Expired rate-limit windows removed");
                }
            }
        }
    })
}

/// Middleware: general request limiter.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("global:{}", get_client_key(&req));
    let decision = state.rate_limiter.check(&key).await;
    if !decision.allowed {
        return Err(AppError::RateLimited {
            reset_at: decision.reset_time(),
        });
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_max_then_blocks_until_reset() {
        let limiter = RateLimiter::new(5, 900);
        let now = 1_700_000_000;

        for expected_remaining in (0..5).rev() {
            let d = limiter.check_at("login:1.2.3.4", now).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
            assert_eq!(d.reset_at, now + 900);
        }

        let blocked = limiter.check_at("login:1.2.3.4", now + 60).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);

        let other = limiter.check_at("login:5.6.7.8", now + 60).await;
        assert!(other.allowed);

        let after = limiter.check_at("login:1.2.3.4", now + 900).await;
        assert!(after.allowed);
        assert_eq!(after.remaining, 4);
    }

    #[tokio::test]
    async fn purge_drops_only_finished_windows() {
        let windows = InMemoryWindows::default();
        windows.hit("a", 100, 10).await;
        windows.hit("b", 105, 10).await;

        assert_eq!(windows.purge_expired(111).await, 1);
        assert_eq!(windows.purge_expired(111).await, 0);
        assert_eq!(windows.hit("b", 111, 10).await.count, 2);
    }

    #[test]
    fn forwarded_headers_are_used_as_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_ip(&headers), None);
        headers.insert("x-real-ip", "10.0.0.9".parse().unwrap());
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("10.0.0.9"));
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("203.0.113.7"));

        let peer: SocketAddr = "192.0.2.1:40000".parse().unwrap();
        assert_eq!(client_ip(Some(peer), &headers), "192.0.2.1");
        assert_eq!(client_ip(None, &HeaderMap::new()), "unknown");
    }
}
