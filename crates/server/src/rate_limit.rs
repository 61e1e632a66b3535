//! A per-address token bucket guarding the accept loop against a single IP opening
//! connections faster than `connections_per_ip_rate` allows.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    /// `per_minute` new connections are allowed per address, refilled continuously.
    pub fn new(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self { capacity, refill_per_sec: capacity / 60.0, buckets: Mutex::new(HashMap::new()) }
    }

    /// Consume one token for `addr`. Returns `false` once the bucket is empty.
    pub fn check(&self, addr: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(addr).or_insert_with(|| Bucket { tokens: self.capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that haven't been touched in a while, so a long-running daemon
    /// doesn't accumulate one entry per address it has ever seen.
    pub fn sweep(&self, older_than: Duration) {
        let now = Instant::now();
        self.buckets.lock().retain(|_, bucket| now.duration_since(bucket.last_refill) < older_than);
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
