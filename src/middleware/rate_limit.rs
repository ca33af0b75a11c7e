use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Fixed-window limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    // IP -> (request_count, window_start)
    clients: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_duration: Duration::from_secs(window_seconds),
        }
    }

    pub fn check_rate_limit(&self, client_ip: &str) -> bool {
        self.check_at(client_ip, Instant::now())
    }

    fn check_at(&self, client_ip: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match clients.get_mut(client_ip) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) > self.window_duration {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                clients.insert(client_ip.to_string(), (1, now));
                true
            }
        }
    }

    pub fn cleanup_expired(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        clients.retain(|_, (_, window_start)| now.duration_since(*window_start) <= self.window_duration);
    }

    fn retry_after_secs(&self) -> u64 {
        self.window_duration.as_secs()
    }
}

fn limit(
    limiter: &RateLimiter,
    addr: SocketAddr,
    scope: &str,
) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    let client_ip = addr.ip().to_string();

    if !limiter.check_rate_limit(&client_ip) {
        tracing::warn!("Rate limit exceeded for IP {} on {} routes", client_ip, scope);
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "message": "Rate limit exceeded. Please try again later.",
                "retry_after": limiter.retry_after_secs()
            })),
        ));
    }

    // Occasionally clean up expired entries
    if rand::random::<u8>() < 10 {
        limiter.cleanup_expired();
    }
    Ok(())
}

/// Sign-in, sign-up and password-reset routes: 10 requests per minute per IP.
pub async fn auth_rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    static AUTH_RATE_LIMITER: OnceLock<RateLimiter> = OnceLock::new();
    let limiter = AUTH_RATE_LIMITER.get_or_init(|| RateLimiter::new(10, 60));

    limit(limiter, addr, "auth")?;
    Ok(next.run(request).await)
}

/// Generation routes call a paid upstream model: 30 requests per minute per IP.
pub async fn generation_rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    static GENERATION_RATE_LIMITER: OnceLock<RateLimiter> = OnceLock::new();
    let limiter = GENERATION_RATE_LIMITER.get_or_init(|| RateLimiter::new(30, 60));

    limit(limiter, addr, "generation")?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_after_max_requests() {
        let limiter = RateLimiter::new(3, 60);
        let now = Instant::now();
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(!limiter.check_at("10.0.0.1", now));

        // Other clients have their own window
        assert!(limiter.check_at("10.0.0.2", now));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, 60);
        let start = Instant::now();
        assert!(limiter.check_at("10.0.0.1", start));
        assert!(!limiter.check_at("10.0.0.1", start + Duration::from_secs(30)));
        assert!(limiter.check_at("10.0.0.1", start + Duration::from_secs(61)));
    }

    #[test]
    fn test_cleanup_keeps_active_windows() {
        let limiter = RateLimiter::new(5, 60);
        assert!(limiter.check_rate_limit("10.0.0.1"));
        limiter.cleanup_expired();
        assert_eq!(limiter.clients.lock().unwrap().len(), 1);
    }
}
