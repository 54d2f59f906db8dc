//! Per-client request throttling for the IPC server

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Token bucket keyed by client. A full bucket is granted on first contact
/// and refilled whole once per `window`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: HashMap<ClientId, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    remaining: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if the request is admitted.
    pub fn check(&mut self, client: &ClientId) -> bool {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&mut self, client: &ClientId, now: Instant) -> bool {
        let capacity = self.capacity;
        let window = self.window;
        let bucket = self.buckets.entry(*client).or_insert(Bucket {
            remaining: capacity,
            window_start: now,
        });

        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.remaining = capacity;
            bucket.window_start = now;
        }

        match bucket.remaining.checked_sub(1) {
            Some(left) => {
                bucket.remaining = left;
                true
            }
            None => false,
        }
    }

    /// Forget a disconnected client
    pub fn remove_client(&mut self, client: &ClientId) {
        self.buckets.remove(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_capacity_is_refused() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1));
        let client = ClientId::new();
        let t0 = Instant::now();

        assert!(limiter.check_at(&client, t0));
        assert!(limiter.check_at(&client, t0));
        assert!(limiter.check_at(&client, t0));
        assert!(!limiter.check_at(&client, t0));
    }

    #[test]
    fn bucket_refills_after_window() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(100));
        let client = ClientId::new();
        let t0 = Instant::now();

        assert!(limiter.check_at(&client, t0));
        assert!(!limiter.check_at(&client, t0 + Duration::from_millis(50)));
        assert!(limiter.check_at(&client, t0 + Duration::from_millis(150)));
    }

    #[test]
    fn clients_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let a = ClientId::new();
        let b = ClientId::new();

        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));
        assert!(limiter.check(&b));

        // a reconnecting client starts with a full bucket
        limiter.remove_client(&a);
        assert!(limiter.check(&a));
    }
}
