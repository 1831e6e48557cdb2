//! Fixed-window request counting per key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    count: u32,
    reset_at: u64,
}

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Milliseconds since the epoch at which the window closes.
    pub reset_at: u64,
}

impl Decision {
    /// Whole seconds until the window closes, as sent in `Retry-After`.
    pub fn retry_after(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).div_ceil(1000)
    }
}

/// In-process limiter. Windows are dropped lazily once expired and do not
/// survive a restart.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Window>>,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, now_millis())
    }

    pub fn check_at(&self, key: &str, now: u64) -> Decision {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|_, window| window.reset_at >= now);

        let window = entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window.as_millis() as u64,
        });

        if window.count >= self.limit {
            return Decision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_at: window.reset_at,
            };
        }
        window.count += 1;
        Decision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - window.count,
            reset_at: window.reset_at,
        }
    }
}

/// Caller address from proxy headers, `unknown` when none is present.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(ip) = header("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    header("x-real-ip").unwrap_or("unknown").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_fourth_request_refused() {
        let limiter = RateLimiter::new(3, Duration::from_secs(900));
        let now = 1_000_000;

        let remaining: Vec<u32> = (0..3)
            .map(|_| limiter.check_at("contact:1.2.3.4", now).remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let refused = limiter.check_at("contact:1.2.3.4", now + 1);
        assert!(!refused.allowed);
        assert_eq!(refused.retry_after(now + 1), 900);

        assert!(limiter.check_at("contact:5.6.7.8", now + 1).allowed);
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check_at("k", 0).allowed);
        assert!(!limiter.check_at("k", 30_000).allowed);
        assert!(limiter.check_at("k", 60_001).allowed);
    }

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("9.9.9.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers), "9.9.9.9");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.1.1.1"));
        assert_eq!(client_ip(&headers), "1.1.1.1");
    }
}
