//! Per-client fixed-window rate limiting

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::{sync::Mutex, time::Instant};

use crate::{config::LimiterConfig, error::ApiError, state::AppState};

const STALE_AFTER: Duration = Duration::from_secs(3 * 60);
pub const SWEEP_EVERY: Duration = Duration::from_secs(60);

struct ClientEntry {
    count: u32,
    window_start: Instant,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    /// client IP -> entry
    clients: Arc<Mutex<HashMap<String, ClientEntry>>>,
}

impl RateLimiter {
    pub fn new(cfg: &LimiterConfig) -> Self {
        Self {
            max_requests: cfg.max_requests,
            window: cfg.window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub async fn check(&self, ip: &str) -> bool {
        let mut clients = self.clients.lock().await;
        let now = Instant::now();

        let entry = clients.entry(ip.to_owned()).or_insert_with(|| ClientEntry {
            count: 0,
            window_start: now,
            last_seen: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.last_seen = now;
        entry.count += 1;
        entry.count <= self.max_requests
    }

    /// Drops clients not seen for three minutes.
    pub async fn sweep(&self) {
        let now = Instant::now();
        self.clients
            .lock()
            .await
            .retain(|_, entry| now.duration_since(entry.last_seen) < STALE_AFTER);
    }

    pub async fn tracked(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// X-Forwarded-For first entry, then the peer address.
fn client_ip(request: &Request) -> String {
    if let Some(first) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        let ip = first.trim();
        if !ip.is_empty() {
            return ip.to_owned();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.limiter.enabled {
        let ip = client_ip(&request);
        if !state.rate_limiter.check(&ip).await {
            return Err(ApiError::RateLimited);
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(&LimiterConfig {
            enabled: true,
            max_requests,
            window,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_limit_per_window() {
        let rl = limiter(2, Duration::from_secs(1));
        assert!(rl.check("10.0.0.1").await);
        assert!(rl.check("10.0.0.1").await);
        assert!(!rl.check("10.0.0.1").await);
        assert!(rl.check("10.0.0.2").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(rl.check("10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_idle_clients() {
        let rl = limiter(5, Duration::from_secs(1));
        rl.check("10.0.0.1").await;
        tokio::time::advance(Duration::from_secs(120)).await;
        rl.check("10.0.0.2").await;
        tokio::time::advance(Duration::from_secs(61)).await;

        rl.sweep().await;
        assert_eq!(rl.tracked().await, 1);
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "203.0.113.7");

        let req = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_ip(&req), "unknown");
    }
}
