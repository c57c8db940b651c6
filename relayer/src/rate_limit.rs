use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const MAX_ENTRIES: usize = 20_000;
const IDLE_EVICT_MS: u128 = 600_000;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_ms: u128,
    cap: f64,
    refill_per_ms: f64,
}

impl TokenBucket {
    fn new(per_min: u32, now_ms: u128) -> Self {
        let cap = per_min.max(1) as f64;
        Self {
            tokens: cap,
            last_ms: now_ms,
            cap,
            refill_per_ms: cap / 60_000.0,
        }
    }

    fn try_take(&mut self, now_ms: u128, n: f64) -> bool {
        let dt = now_ms.saturating_sub(self.last_ms) as f64;
        if dt > 0.0 {
            self.tokens = (self.tokens + dt * self.refill_per_ms).min(self.cap);
            self.last_ms = now_ms;
        }
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }
}

struct RateLimiterEntry {
    bucket: TokenBucket,
    last_seen_ms: u128,
}

/// Two buckets per client IP: one for accepted POSTs, a tighter one for
/// requests that failed validation or the business rule.
pub struct RateLimiter {
    ok_per_min: u32,
    bad_per_min: u32,
    ok: HashMap<IpAddr, RateLimiterEntry>,
    bad: HashMap<IpAddr, RateLimiterEntry>,
}

impl RateLimiter {
    pub fn new(ok_per_min: u32, bad_per_min: u32) -> Self {
        Self {
            ok_per_min,
            bad_per_min,
            ok: HashMap::new(),
            bad: HashMap::new(),
        }
    }

    fn cleanup(&mut self, now_ms: u128) {
        if self.ok.len() + self.bad.len() <= MAX_ENTRIES {
            return;
        }
        let cutoff = now_ms.saturating_sub(IDLE_EVICT_MS);
        self.ok.retain(|_, e| e.last_seen_ms >= cutoff);
        self.bad.retain(|_, e| e.last_seen_ms >= cutoff);
        if self.ok.len() + self.bad.len() > MAX_ENTRIES * 2 {
            self.ok.clear();
            self.bad.clear();
        }
    }

    fn take(
        map: &mut HashMap<IpAddr, RateLimiterEntry>,
        per_min: u32,
        ip: IpAddr,
        now_ms: u128,
    ) -> bool {
        let ent = map.entry(ip).or_insert_with(|| RateLimiterEntry {
            bucket: TokenBucket::new(per_min, now_ms),
            last_seen_ms: now_ms,
        });
        ent.last_seen_ms = now_ms;
        ent.bucket.try_take(now_ms, 1.0)
    }

    pub fn allow_ok(&mut self, ip: IpAddr, now_ms: u128) -> bool {
        self.cleanup(now_ms);
        Self::take(&mut self.ok, self.ok_per_min, ip, now_ms)
    }

    pub fn allow_bad(&mut self, ip: IpAddr, now_ms: u128) -> bool {
        self.cleanup(now_ms);
        Self::take(&mut self.bad, self.bad_per_min, ip, now_ms)
    }
}

pub fn rate_limit_ok(state: &Arc<AppState>, ip: IpAddr) -> AppResult<()> {
    let now = crate::utils::now_ms();
    let mut rl = state
        .rate_limiter
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !rl.allow_ok(ip, now) {
        return Err(AppError::TooManyRequests("rate limit exceeded".into()));
    }
    Ok(())
}

pub fn rate_limit_bad(state: &Arc<AppState>, ip: IpAddr) -> AppResult<()> {
    let now = crate::utils::now_ms();
    let mut rl = state
        .rate_limiter
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !rl.allow_bad(ip, now) {
        return Err(AppError::TooManyRequests("too many bad requests".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn bucket_drains_and_refills() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut rl = RateLimiter::new(2, 1);
        assert!(rl.allow_ok(ip, 0));
        assert!(rl.allow_ok(ip, 0));
        assert!(!rl.allow_ok(ip, 0));
        // 2/min refills one token every 30s.
        assert!(rl.allow_ok(ip, 30_000));
    }

    #[test]
    fn buckets_are_per_ip_and_per_kind() {
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let mut rl = RateLimiter::new(1, 1);
        assert!(rl.allow_bad(a, 0));
        assert!(!rl.allow_bad(a, 0));
        assert!(rl.allow_ok(a, 0));
        assert!(rl.allow_bad(b, 0));
    }
}
