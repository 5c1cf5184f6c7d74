// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-IP failed-attempt counter with block expiry.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Failed attempts within the window before an IP is blocked.
pub const MAX_FAILED_ATTEMPTS: u32 = 10;
/// How long a block lasts; also the window failures are counted over.
pub const BLOCK_DURATION: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct IpRecord {
    failures: Vec<Instant>,
    blocked_until: Option<Instant>,
}

/// Tracks failed auth attempts per client IP. A blocked IP answers 429 to
/// every auth attempt until the block expires, valid credentials included.
pub struct RateLimiter {
    inner: Mutex<HashMap<IpAddr, IpRecord>>,
    max_attempts: u32,
    block_duration: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(MAX_FAILED_ATTEMPTS, BLOCK_DURATION)
    }

    pub fn with_limits(max_attempts: u32, block_duration: Duration) -> Self {
        Self { inner: Mutex::new(HashMap::new()), max_attempts, block_duration }
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let mut records = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.get_mut(&ip) else {
            return false;
        };
        match record.blocked_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Block expired: the IP starts from a clean slate.
                records.remove(&ip);
                false
            }
            None => false,
        }
    }

    /// Count a failed attempt. Returns true when this failure tripped the
    /// block.
    pub fn record_failure(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut records = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records.entry(ip).or_default();

        // An expired block means a clean slate before this failure counts.
        if record.blocked_until.is_some_and(|until| now >= until) {
            record.failures.clear();
            record.blocked_until = None;
        }
        record.failures.retain(|at| now.duration_since(*at) < self.block_duration);
        record.failures.push(now);

        if record.failures.len() as u32 >= self.max_attempts && record.blocked_until.is_none() {
            record.blocked_until = Some(now + self.block_duration);
            tracing::warn!(ip = %ip, attempts = record.failures.len(), "blocking ip after repeated auth failures");
            return true;
        }
        false
    }

    /// A successful auth clears the IP's failure history.
    pub fn record_success(&self, ip: IpAddr) {
        let mut records = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(&ip);
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
